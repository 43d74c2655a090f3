//! User configuration options.

use crate::{BASE_DIR, CLIOptions};
use dirs::config_dir;
use log::{LevelFilter, info, warn};
use nanoserde::{DeRon, SerRon};
use std::{
    fs::{File, OpenOptions, create_dir_all},
    io::{self, Read, Write},
    path::PathBuf,
    str::FromStr,
};

const LOG_TAG: &str = "UserConfig";

fn get_cfg_file() -> io::Result<PathBuf> {
    let mut dir = config_dir().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("{LOG_TAG}: Couldn't find user config dir"))
    })?;
    dir.push(BASE_DIR);
    if !dir.exists() {
        create_dir_all(&dir)?;
    }
    dir.push("user.ron");
    Ok(dir)
}

#[derive(Debug, Clone, PartialEq, DeRon, SerRon)]
pub struct UserConfig {
    pub width: u32,
    pub height: u32,
    pub threads: u32,
    pub frames: u32,
    /// Sky columns and flat spans go to the workers
    pub parallel: bool,
    /// One of off, error, warn, info, debug, trace
    pub verbose: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 400,
            threads: 4,
            frames: 350,
            parallel: true,
            verbose: "info".to_string(),
        }
    }
}

impl UserConfig {
    /// Read the stored config, creating a default one if there is none or
    /// it can't be parsed
    pub fn load() -> io::Result<Self> {
        let path = get_cfg_file()?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let mut buf = String::new();
        if file.read_to_string(&mut buf)? == 0 {
            return UserConfig::create_default(&mut file);
        }
        match UserConfig::deserialize_ron(&buf) {
            Ok(data) => {
                info!(target: LOG_TAG, "Loaded user config file");
                Ok(data)
            }
            Err(e) => {
                warn!(target: LOG_TAG, "Could not deserialise {path:?}, recreating config: {e:?}");
                UserConfig::create_default(&mut File::create(&path)?)
            }
        }
    }

    fn create_default(file: &mut File) -> io::Result<Self> {
        let config = UserConfig::default();
        file.write_all(config.serialize_ron().as_bytes())?;
        info!(target: LOG_TAG, "Created default user config file");
        Ok(config)
    }

    pub fn write(&self) -> io::Result<()> {
        let path = get_cfg_file()?;
        let mut file = File::create(&path)?;
        file.write_all(self.serialize_ron().as_bytes())?;
        info!(target: LOG_TAG, "Saved user config to {path:?}");
        Ok(())
    }

    pub fn log_level(&self) -> LevelFilter {
        LevelFilter::from_str(&self.verbose).unwrap_or(LevelFilter::Info)
    }

    /// Sync the CLI options and UserOptions with each other
    pub fn sync_cli(&mut self, cli: &mut CLIOptions) {
        if cli.width != 0 && cli.width != self.width {
            self.width = cli.width;
        } else {
            cli.width = self.width;
        }

        if cli.height != 0 && cli.height != self.height {
            self.height = cli.height;
        } else {
            cli.height = self.height;
        }

        if cli.frames != 0 && cli.frames != self.frames {
            self.frames = cli.frames;
        } else {
            cli.frames = self.frames;
        }

        match cli.threads {
            Some(threads) => self.threads = threads,
            None => cli.threads = Some(self.threads),
        }

        // The switch can only turn parallel drawing off for this run
        if !self.parallel {
            cli.serial = true;
        }

        match cli.verbose {
            Some(level) => self.verbose = level.to_string().to_lowercase(),
            None => cli.verbose = Some(self.log_level()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(args: &[&str]) -> CLIOptions {
        use argh::FromArgs;
        CLIOptions::from_args(&["soft-bench"], args).expect("valid args")
    }

    #[test]
    fn ron_round_trip() {
        let config = UserConfig {
            width: 1280,
            verbose: "debug".to_string(),
            ..UserConfig::default()
        };
        let text = config.serialize_ron();
        assert_eq!(UserConfig::deserialize_ron(&text).unwrap(), config);
    }

    #[test]
    fn cli_overrides_stored_values() {
        let mut config = UserConfig::default();
        let mut cli = options(&["--width", "800", "--threads", "0", "--verbose", "debug"]);
        config.sync_cli(&mut cli);
        assert_eq!(config.width, 800);
        assert_eq!(config.threads, 0);
        assert_eq!(config.log_level(), LevelFilter::Debug);
        // Unset options are filled from the stored config
        assert_eq!(cli.height, 400);
        assert_eq!(cli.frames, 350);
    }

    #[test]
    fn stored_serial_setting_applies() {
        let mut config = UserConfig {
            parallel: false,
            ..UserConfig::default()
        };
        let mut cli = options(&[]);
        config.sync_cli(&mut cli);
        assert!(cli.serial);
        assert_eq!(cli.threads, Some(4));
    }
}
