use std::time::Duration;

use lectern_engine::{LoaderConfig, Platform};
use tracing::info;

use crate::cli::CliArgs;
use crate::error::AppError;

/// Loader configuration for the given arguments: the platform profile first,
/// then any explicit overrides.
pub fn loader_config(args: &CliArgs) -> Result<LoaderConfig, AppError> {
    let platform = args.platform.unwrap_or_else(Platform::detect);
    let mut builder = LoaderConfig::builder().with_platform(platform);

    if let Some(batch_size) = args.batch_size {
        if batch_size == 0 {
            return Err(AppError::InvalidInput(
                "batch size must be at least 1".to_string(),
            ));
        }
        builder = builder.with_batch_size(batch_size);
    }
    if let Some(delay_ms) = args.delay_ms {
        builder = builder.with_inter_batch_delay(Duration::from_millis(delay_ms));
    }
    if let Some(retries) = args.retries {
        if retries == 0 {
            return Err(AppError::InvalidInput(
                "retries must be at least 1".to_string(),
            ));
        }
        builder = builder.with_max_retries(retries);
    }
    if let Some(timeout) = args.timeout {
        builder = builder.with_fetch_timeout(Duration::from_secs(timeout));
    }

    let config = builder.build();
    info!(platform = %platform, "Batch profile: {}", config.profile);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["lectern", "--store", "content"];
        argv.extend_from_slice(extra);
        argv.push("module-1");
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_platform_profile_with_overrides() {
        let config = loader_config(&args(&["-p", "android", "--delay-ms", "25", "-r", "5"])).unwrap();

        assert_eq!(config.profile.batch_size, 2);
        assert_eq!(config.profile.inter_batch_delay, Duration::from_millis(25));
        assert_eq!(config.profile.fetch_timeout, Duration::from_secs(15));
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_zero_values_are_rejected() {
        assert!(matches!(
            loader_config(&args(&["-b", "0"])),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            loader_config(&args(&["-r", "0"])),
            Err(AppError::InvalidInput(_))
        ));
    }
}
