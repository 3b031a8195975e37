use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use linkspy::check::{topology::WordSize, BootImages, Config, Walker};
use linkspy::link::{LinkDevice, DEFAULT_LINK};
use tracing::{error, Level};

/// Tests the connectivity of a transputer network through the link device
/// driver, reporting the type, speed and wiring of every node found.
#[derive(Parser, Debug)]
#[command(name = "linkspy", version, about, long_about = None)]
struct Cli {
    /// Do not reset the root transputer
    #[arg(short = 'n', long = "no-reset")]
    no_reset: bool,
    /// Reset the root transputer subsystem
    #[arg(short = 'r', long = "subsystem-reset")]
    subsystem_reset: bool,
    /// Link device to use
    #[arg(short = 'l', long = "link", default_value = DEFAULT_LINK)]
    link: String,
    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,
    /// Extra verbose mode
    #[arg(long = "vv")]
    very_verbose: bool,
    /// Show device driver calls
    #[arg(short = 'd', long = "device-verbose")]
    device_verbose: bool,
    /// Check program for 16-bit transputers
    #[arg(long)]
    image16: Option<PathBuf>,
    /// Check program for 32-bit transputers
    #[arg(long)]
    image32: Option<PathBuf>,
}

impl Cli {
    fn log_level(&self) -> Level {
        if self.device_verbose {
            Level::TRACE
        } else if self.very_verbose {
            Level::DEBUG
        } else if self.verbose {
            Level::INFO
        } else {
            Level::WARN
        }
    }
}

/// Loads whichever check programs were given. Nodes of a word size without
/// a program fail only when the walk reaches them.
fn load_images(cli: &Cli) -> Result<BootImages, String> {
    let mut images = BootImages::new();
    for (word_size, path) in [
        (WordSize::Bits16, &cli.image16),
        (WordSize::Bits32, &cli.image32),
    ] {
        let Some(path) = path else { continue };
        let code = std::fs::read(path)
            .map_err(|e| format!("unable to read {}: {}", path.display(), e))?;
        images = images
            .with_image(word_size, code)
            .map_err(|e| format!("{}: {}", path.display(), e))?;
    }
    Ok(images)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .init();

    println!("linkspy v{}", env!("CARGO_PKG_VERSION"));

    let images = match load_images(&cli) {
        Ok(images) => images,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };

    let mut device = match LinkDevice::open(&cli.link) {
        Ok(device) => device,
        Err(e) => {
            error!("{}", e);
            println!("Unable to continue");
            return ExitCode::from(2);
        }
    };

    let config = Config::builder()
        .root_reset(!cli.no_reset)
        .subsystem_reset(cli.subsystem_reset)
        .build();

    match Walker::new(&mut device, config, &images).run() {
        Ok(topology) => {
            println!("Using {}", device.path());
            print!("{}", topology);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("check failed: {}", e);
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_follow_the_original_tool() {
        let cli = Cli::parse_from(["linkspy", "-n", "-r", "-l", "/dev/link1", "--vv"]);
        assert!(cli.no_reset);
        assert!(cli.subsystem_reset);
        assert_eq!(cli.link, "/dev/link1");
        assert_eq!(cli.log_level(), Level::DEBUG);

        let cli = Cli::parse_from(["linkspy"]);
        assert_eq!(cli.link, DEFAULT_LINK);
        assert_eq!(cli.log_level(), Level::WARN);
    }

    #[test]
    fn runs_without_check_programs() {
        let cli = Cli::parse_from(["linkspy"]);
        let images = load_images(&cli).unwrap();
        assert!(images.for_word_size(WordSize::Bits16).is_none());
        assert!(images.for_word_size(WordSize::Bits32).is_none());

        let cli = Cli::parse_from(["linkspy", "--image16", "/nonexistent/check16.btl"]);
        assert!(load_images(&cli)
            .unwrap_err()
            .starts_with("unable to read /nonexistent/check16.btl"));
    }
}
