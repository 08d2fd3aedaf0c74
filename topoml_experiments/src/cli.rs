//! Command line shared by every experiment binary.

use clap::Parser;

#[derive(Parser, Debug, Clone, Copy, Default)]
#[command(version, about = "Geometry classification experiment")]
pub struct Cli {
    /// Final test mode: evaluate on the separate test file instead of a
    /// random split of the training data
    #[arg(short = 't', long = "test")]
    pub test: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Hold out a random fraction of the training data
    Standard,
    /// Evaluate on the published test set
    FinalTest,
}

impl Cli {
    pub fn mode(&self) -> RunMode {
        if self.test {
            RunMode::FinalTest
        } else {
            RunMode::Standard
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_mode_by_default() {
        let cli = Cli::try_parse_from(["archaeology_convnet"]).unwrap();
        assert_eq!(cli.mode(), RunMode::Standard);
    }

    #[test]
    fn test_short_and_long_flags() {
        for flag in ["-t", "--test"] {
            let cli = Cli::try_parse_from(["building_dense", flag]).unwrap();
            assert_eq!(cli.mode(), RunMode::FinalTest);
        }
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        assert!(Cli::try_parse_from(["building_dense", "--fast"]).is_err());
    }
}
