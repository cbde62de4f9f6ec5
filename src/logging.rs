use std::path::Path;

use flexi_logger::{
    opt_format, Cleanup, Criterion, Duplicate, FileSpec, FlexiLoggerError, Logger, LoggerHandle,
    Naming,
};

/// Start the global logger.
///
/// Records go to stderr so stdout only carries the summary. With a log
/// directory they are written to rotating files instead, warnings and errors
/// still mirrored on stderr. `RUST_LOG` overrides the default `info` level.
pub fn setup_logging(log_dir: Option<&Path>) -> Result<LoggerHandle, FlexiLoggerError> {
    let logger = Logger::try_with_env_or_str("info")?.format(opt_format);

    let logger = match log_dir {
        Some(dir) => logger
            .log_to_file(FileSpec::default().directory(dir).basename("actor_inspect"))
            .rotate(
                Criterion::Size(10 * 1024 * 1024), // Rotate logs after they reach 10 MB
                Naming::Numbers,
                Cleanup::KeepLogFiles(7),
            )
            .duplicate_to_stderr(Duplicate::Warn),
        None => logger.log_to_stderr(),
    };

    logger.start()
}
