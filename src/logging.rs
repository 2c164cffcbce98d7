use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};

/// log4rs 設定檔相對於工作區根目錄的位置。
const LOG4RS_CONFIG: &str = "config/log4rs.yaml";

/// 初始化日誌系統。
///
/// 工作區中有 `config/log4rs.yaml` 時使用 log4rs；否則退回 env_logger，
/// 預設等級為 `info`，可用 `RUST_LOG` 覆寫。兩者都只輸出到 stderr 或檔案，
/// 不會和 stdout 上的對話內容混在一起。
pub fn init(workspace_root: &Path) -> Result<()> {
    let config_path = workspace_root.join(LOG4RS_CONFIG);
    let mut fallback_reason = None;
    if config_path.exists() {
        match log4rs::init_file(&config_path, Default::default()) {
            Ok(()) => {
                info!("Logging configured from {}", config_path.display());
                return Ok(());
            }
            Err(err) => fallback_reason = Some(format!("{err:#}")),
        }
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init()
        .context("無法初始化 env_logger")?;
    if let Some(reason) = fallback_reason {
        warn!(
            "Ignoring {} and logging to stderr instead: {}",
            config_path.display(),
            reason
        );
    }
    Ok(())
}
