use crate::{pipeline::ConfigError, volume::VolumeError};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid volume")]
    InvalidVolume(#[from] VolumeError),
    #[error("invalid PSF configuration")]
    Config(#[from] ConfigError),
}
