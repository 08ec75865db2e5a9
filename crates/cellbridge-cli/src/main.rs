use std::{
    cell::RefCell,
    io::{self, BufReader},
    rc::Rc,
};

use cellbridge::{Bridge, DEFAULT_MAX_RECURSION_DEPTH, MemoryContextHost, Session, SessionConfig, TransportError};
use tracing::info;

mod transport;

use transport::{FramedOutput, StdioChannel};

fn main() -> io::Result<()> {
    init_tracing();
    let args: Vec<String> = std::env::args().collect();
    let config = parse_config(&args, std::env::var("CELLBRIDGE_MAX_DEPTH").ok().as_deref());

    let writer = Rc::new(RefCell::new(io::stdout().lock()));
    let output = FramedOutput::new(Rc::clone(&writer));
    let session = Session::new(config, Box::new(MemoryContextHost::new()), Box::new(output));
    let channel = StdioChannel::new(BufReader::new(io::stdin().lock()), writer);

    let mut bridge = Bridge::new(channel, session);
    match bridge.serve() {
        Ok(summary) => {
            info!(
                batches = summary.batches,
                completions = summary.completions,
                failures = summary.failures,
                "session ended"
            );
            Ok(())
        }
        Err(TransportError::Io(err)) => Err(err),
        Err(err) => Err(io::Error::other(err)),
    }
}

/// Logs go to stderr, since stdout carries the protocol. Enabled only when `RUST_LOG` is set.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    if std::env::var("RUST_LOG").is_ok() {
        let filter = EnvFilter::from_default_env();
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::stderr).with_target(true).with_level(true))
            .with(filter)
            .init();
    }
}

/// Reads `--script-name`, `--context-name` and `--max-depth` from the command line.
///
/// `--max-depth` falls back to `env_max_depth` (`$CELLBRIDGE_MAX_DEPTH`), then to
/// [`DEFAULT_MAX_RECURSION_DEPTH`]. Unparseable depths are ignored.
fn parse_config(args: &[String], env_max_depth: Option<&str>) -> SessionConfig {
    let flag = |name: &str| {
        args.windows(2)
            .find(|pair| pair[0] == name)
            .map(|pair| pair[1].clone())
    };

    let mut config = SessionConfig::default();
    if let Some(script_name) = flag("--script-name") {
        config = config.with_script_name(script_name);
    }
    if let Some(context_name) = flag("--context-name") {
        config = config.with_context_name(context_name);
    }
    let max_depth = flag("--max-depth")
        .as_deref()
        .or(env_max_depth)
        .and_then(|depth| depth.trim().parse::<usize>().ok())
        .unwrap_or(DEFAULT_MAX_RECURSION_DEPTH);
    config.with_max_recursion_depth(max_depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| (*arg).to_owned()).collect()
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse_config(
            &args(&["cellbridge", "--context-name", "ctx", "--max-depth", "12"]),
            Some("40"),
        );
        assert_eq!(config.context_name, "ctx");
        assert_eq!(config.max_recursion_depth, 12);
        assert_eq!(config.script_name, "<stdin>");
    }

    #[test]
    fn env_depth_is_the_fallback() {
        let config = parse_config(&args(&["cellbridge"]), Some("40"));
        assert_eq!(config.max_recursion_depth, 40);
        let config = parse_config(&args(&["cellbridge"]), Some("lots"));
        assert_eq!(config.max_recursion_depth, DEFAULT_MAX_RECURSION_DEPTH);
    }
}
