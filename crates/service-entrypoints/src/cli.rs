use clap::Parser;

/// Parse settings from the command line, falling back to the environment for `env` arguments.
pub fn parse_args<T: Parser>() -> Result<T, clap::Error> {
    T::try_parse()
}
