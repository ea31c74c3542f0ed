use fern::colors::{Color, ColoredLevelConfig};
use log::Level;

/// Install the process-wide logger: `timestamp level target message` lines
/// on stderr, filtered at `level`.
///
/// Fails if a logger is already installed.
pub fn init_logging(level: Level) -> anyhow::Result<()> {
	let colors = ColoredLevelConfig::new()
		.error(Color::Red)
		.warn(Color::Yellow)
		.info(Color::Green)
		.debug(Color::Blue)
		.trace(Color::Magenta);

	fern::Dispatch::new()
		.format(move |out, message, record| {
			out.finish(format_args!(
				"{} {} {} {}",
				chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
				colors.color(record.level()),
				record.target(),
				message
			))
		})
		.level(level.to_level_filter())
		.chain(std::io::stderr())
		.apply()
		.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

	Ok(())
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use log::Level;

	#[test]
	fn logging_initializes_once() {
		// The logger is process-wide; another test may have installed one.
		let _ = super::init_logging(Level::Debug);
		assert!(super::init_logging(Level::Debug).is_err());
	}
}
