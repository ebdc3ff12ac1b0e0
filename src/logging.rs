use env_logger::{Builder, Env};

/// Install the global logger. `RUST_LOG` wins; otherwise `-v` raises the
/// default `warn` level to `info` and `-vv` to `debug`. `--quiet` keeps errors only.
pub fn init(verbose: u8, quiet: bool) {
    let default = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    Builder::from_env(Env::default().default_filter_or(default))
        .format_timestamp_millis()
        .format_module_path(false)
        .init();
}
