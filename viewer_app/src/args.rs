//! Command line parsing
//!
//! Usage: `mesh_viewer [--config <file>] <model.obj>...`

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, Command};

/// Parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    /// Optional `.toml` or `.ron` configuration file
    pub config: Option<PathBuf>,
    /// OBJ files to load, in order
    pub models: Vec<PathBuf>,
}

impl Args {
    fn command() -> Command {
        Command::new("mesh_viewer")
            .about("Loads OBJ models into one scene and draws them with Vulkan")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .value_parser(value_parser!(PathBuf))
                    .help("Viewer configuration (.toml or .ron)"),
            )
            .arg(
                Arg::new("models")
                    .value_name("MODEL")
                    .value_parser(value_parser!(PathBuf))
                    .action(ArgAction::Append)
                    .num_args(1..)
                    .required(true)
                    .help("OBJ files to load"),
            )
    }

    /// Parse the process command line, exiting with usage on error
    pub fn parse() -> Self {
        Self::from_matches(&Self::command().get_matches())
    }

    /// Parse an explicit argument list; the first item is the program name
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        Ok(Self::from_matches(&matches))
    }

    fn from_matches(matches: &clap::ArgMatches) -> Self {
        Self {
            config: matches.get_one::<PathBuf>("config").cloned(),
            models: matches
                .get_many::<PathBuf>("models")
                .map(|paths| paths.cloned().collect())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("mesh_viewer").chain(args.iter().copied()))
    }

    #[test]
    fn test_models_and_config() {
        let args = parse(&["a.obj", "--config", "viewer.toml", "b.obj"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("viewer.toml")));
        assert_eq!(args.models, vec![PathBuf::from("a.obj"), PathBuf::from("b.obj")]);

        let args = parse(&["-c", "viewer.ron", "teapot.obj"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("viewer.ron")));
        assert_eq!(args.models, vec![PathBuf::from("teapot.obj")]);
    }

    #[test]
    fn test_config_is_optional() {
        let args = parse(&["teapot.obj"]).unwrap();
        assert_eq!(args.config, None);
    }

    #[test]
    fn test_rejects_bad_command_lines() {
        assert_eq!(parse(&[]).unwrap_err().kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(parse(&["a.obj", "--config"]).unwrap_err().kind(), ErrorKind::InvalidValue);
        assert_eq!(parse(&["--fullscreen", "a.obj"]).unwrap_err().kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_command_definition_is_consistent() {
        Args::command().debug_assert();
    }
}
