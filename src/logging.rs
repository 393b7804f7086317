use tracing_subscriber::EnvFilter;

/// Level used when `RUST_LOG` is not set; each `-v` raises it one step.
fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Installs the stderr subscriber. `RUST_LOG` overrides the CLI verbosity.
pub fn init_logging(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level_for(verbosity);
        EnvFilter::new(format!("warn,lms_completion_reconciler={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
