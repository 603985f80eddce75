use std::path::Path;

use lg_storage::R2Client;
use lg_worker::PipelineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = PipelineConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_binary("ffmpeg")?;
    ensure_binary("ffprobe")?;
    ensure_env_present(&[
        "GEMINI_API_KEY",
        "R2_ENDPOINT_URL",
        "R2_ACCESS_KEY_ID",
        "R2_SECRET_ACCESS_KEY",
        "R2_BUCKET_NAME",
    ])?;
    ensure_any_env_present(&["GCP_PROJECT_ID", "FIREBASE_PROJECT_ID"])?;
    if std::env::var("FIRESTORE_EMULATOR_HOST").is_err() {
        ensure_env_present(&["GOOGLE_APPLICATION_CREDENTIALS"])?;
    }

    if std::env::args().any(|a| a == "--connect") {
        ensure_r2_reachable().await?;
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path.as_ref()).await?;
    Ok(())
}

fn ensure_binary(name: &str) -> anyhow::Result<()> {
    let path = which::which(name).map_err(|e| anyhow::anyhow!("{} not available: {}", name, e))?;
    println!("worker-selfcheck: {} at {}", name, path.display());
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}

fn ensure_any_env_present(vars: &[&str]) -> anyhow::Result<()> {
    if vars.iter().any(|v| std::env::var(v).is_ok()) {
        Ok(())
    } else {
        Err(anyhow::anyhow!("set one of {}", vars.join(", ")))
    }
}

async fn ensure_r2_reachable() -> anyhow::Result<()> {
    let client = R2Client::from_env()?;
    client.check_connectivity().await?;
    println!("worker-selfcheck: bucket {} reachable", client.bucket());
    Ok(())
}
