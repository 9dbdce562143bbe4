use fern::Dispatch;
use log::LevelFilter;

/// # parse a logging level
/// unknown values fall back to info
pub fn parse_level(verbosity: &str) -> LevelFilter {
    match verbosity.trim().to_uppercase().as_str() {
        "OFF" => LevelFilter::Off,
        "ERROR" => LevelFilter::Error,
        "WARN" => LevelFilter::Warn,
        "DEBUG" => LevelFilter::Debug,
        "TRACE" => LevelFilter::Trace,
        _ => {
            // default to info
            LevelFilter::Info
        }
    }
}

/// # set up the global logger
/// every line goes to stdout and to `log_file`
///
/// ## Arguments
/// * `level` - the most verbose level that is written
/// * `log_file` - path of the file that receives a copy of every line
pub fn setup_logging(level: LevelFilter, log_file: &str) -> Result<(), fern::InitError> {
    Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .chain(fern::log_file(log_file)?)
        .apply()?;

    Ok(())
}
