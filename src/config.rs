use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("usage: bulk_server <port> <bulk_size> [<max_cmds_in_files>]")]
    MissingArguments,

    #[error("port must be an integer in [0, 65535]: {0}")]
    InvalidPort(String),

    #[error("bulk_size must be an integer >= 1: {0}")]
    InvalidBulkSize(String),

    #[error("max_cmds_in_files must be a non-negative integer: {0}")]
    InvalidMaxCmdsInFiles(String),
}

#[derive(Debug, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bulk_size: usize,
    pub max_cmds_in_files: Option<u64>,
}

impl Config {
    pub fn from_args() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self::parse(&args)
    }

    fn parse(args: &[String]) -> Result<Self, ConfigError> {
        let port = args.first().ok_or(ConfigError::MissingArguments)?;
        let bulk_size = args.get(1).ok_or(ConfigError::MissingArguments)?;

        let port: u16 = port
            .parse()
            .map_err(|_| ConfigError::InvalidPort(port.clone()))?;

        let bulk_size: usize = bulk_size
            .parse()
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| ConfigError::InvalidBulkSize(bulk_size.clone()))?;

        let max_cmds_in_files = match args.get(2) {
            Some(raw) => {
                let parsed: u64 = raw
                    .parse()
                    .map_err(|_| ConfigError::InvalidMaxCmdsInFiles(raw.clone()))?;
                if parsed == 0 { None } else { Some(parsed) }
            }
            None => None,
        };

        Ok(Self {
            port,
            bulk_size,
            max_cmds_in_files,
        })
    }
}

pub fn fatal(err: &ConfigError) -> ! {
    eprintln!("{err}");
    std::process::exit(1);
}
