use crate::config::LoggingSettings;
use std::any::Any;
use std::env;
use std::fs;
use std::io;
use std::sync::Arc;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Build the filter from `RUST_LOG`, falling back to the configured level
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = EnvFilter::new(level);
        for directive in ["avatar_outfitter=debug", "hyper=warn", "reqwest=warn"] {
            if let Ok(directive) = directive.parse() {
                filter = filter.add_directive(directive);
            }
        }
        filter
    })
}

/// Message carried by a panic, for both `panic!("literal")` and formatted panics
fn panic_payload(payload: &(dyn Any + Send)) -> Option<&str> {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return Some(s);
    }
    payload.downcast_ref::<String>().map(String::as_str)
}

/// Initialize console logging, plus a plain-text file layer when
/// `settings.file` is set. The file is truncated on every start.
///
/// Calling this more than once keeps the first subscriber.
pub fn init_logging(settings: &LoggingSettings) -> io::Result<()> {
    let enable_backtrace = env::var("RUST_BACKTRACE").map(|v| v == "1").unwrap_or(false);

    let file_layer = match &settings.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = fs::File::create(path)?;
            Some(
                fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_span_events(FmtSpan::CLOSE)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter(&settings.level))
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_ansi(true),
        )
        .with(file_layer)
        .try_init()
        .is_ok();

    if !installed {
        return Ok(());
    }

    std::panic::set_hook(Box::new(move |panic_info| {
        tracing::error!("Panic occurred: {}", panic_info);

        if let Some(location) = panic_info.location() {
            tracing::error!(
                "Panic location: {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        }

        if let Some(s) = panic_payload(panic_info.payload()) {
            tracing::error!("Panic payload: {}", s);
        }

        if enable_backtrace {
            tracing::error!("Backtrace:\n{:?}", std::backtrace::Backtrace::capture());
        }
    }));

    tracing::info!("Logging initialized with level: {}", settings.level);
    if let Some(path) = &settings.file {
        tracing::info!("File logging enabled: {}", path.display());
    }
    Ok(())
}

/// Log system information for debugging
pub fn log_system_info() {
    tracing::info!("=== System Information ===");
    tracing::info!("OS: {}", env::consts::OS);
    tracing::info!("Architecture: {}", env::consts::ARCH);
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Ok(filter) = env::var("RUST_LOG") {
        tracing::info!("RUST_LOG: {}", filter);
    }
    tracing::info!("==========================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_layer_creates_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("outfitter.log");
        let settings = LoggingSettings {
            level: "debug".into(),
            file: Some(path.clone()),
        };

        init_logging(&settings).unwrap();
        assert!(path.exists());

        // a second call must not panic
        init_logging(&settings).unwrap();
    }

    #[test]
    fn test_panic_payload_reads_literal_and_formatted_messages() {
        let literal = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_payload(&*literal), Some("boom"));

        let code = 42;
        let formatted = std::panic::catch_unwind(|| panic!("exit code {}", code)).unwrap_err();
        assert_eq!(panic_payload(&*formatted), Some("exit code 42"));

        let opaque: Box<dyn Any + Send> = Box::new(7u32);
        assert_eq!(panic_payload(&*opaque), None);
    }
}
