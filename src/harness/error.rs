use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("process was already started")]
    AlreadyStarted,
    #[error("process is not started")]
    NotStarted,
    #[error("expectation timed out waiting for `{regex}` in `{label}`")]
    ExpectTimeout { regex: String, label: String },
    #[error("invalid regular expression `{0}`: `{1}`")]
    InvalidRegex(String, regex::Error),
    #[error("io error: `{0}`")]
    Io(#[from] io::Error),
    #[error("signal error: `{0}`")]
    Signal(#[from] nix::Error),
}
