use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Poll the bot API and answer photos
    Bot,
    /// Serve the upload/prediction HTTP API
    Api,
    All,
}

impl Mode {
    pub fn runs_bot(self) -> bool {
        matches!(self, Mode::Bot | Mode::All)
    }

    pub fn runs_api(self) -> bool {
        matches!(self, Mode::Api | Mode::All)
    }
}

#[derive(Parser, Debug)]
#[clap(about = "Photo classification bot and prediction API")]
pub struct Cli {
    #[clap(long, value_enum, default_value_t = Mode::All)]
    /// Which components to run
    pub mode: Mode,
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
