use std::borrow::Cow;

use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("Invalid: {0}")]
    Invalid(Cow<'static, str>),
    #[error("Invalid parameter: {0} {1}")]
    InvalidParameter(Cow<'static, str>, Cow<'static, str>),
    #[error("Unsupported: {0}")]
    Unsupported(Cow<'static, str>),
    #[error("Codec failed: {0}")]
    CodecFailed(Cow<'static, str>),
    #[error("Corrupt stream: {0}")]
    CorruptStream(Cow<'static, str>),
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(Cow<'static, str>),
    #[error("Not implemented")]
    NotImplemented,
}

#[macro_export]
macro_rules! invalid_error {
    ($param:literal) => {
        $crate::error::Error::Invalid($param.into())
    };
    ($param:expr) => {
        $crate::error::Error::Invalid(format!("{:?}", $param).into())
    };
}

#[macro_export]
macro_rules! invalid_param_error {
    ($param:expr) => {
        $crate::error::Error::InvalidParameter(stringify!($param).into(), format!("{:?}", $param).into())
    };
}

#[macro_export]
macro_rules! unsupported_error {
    ($param:literal) => {
        $crate::error::Error::Unsupported($param.into())
    };
    ($param:expr) => {
        $crate::error::Error::Unsupported(format!("{:?}", $param).into())
    };
}

#[macro_export]
macro_rules! codec_error {
    ($param:literal) => {
        $crate::error::Error::CodecFailed($param.into())
    };
    ($param:expr) => {
        $crate::error::Error::CodecFailed(format!("{}", $param).into())
    };
}

#[macro_export]
macro_rules! corrupt_error {
    ($param:literal) => {
        $crate::error::Error::CorruptStream($param.into())
    };
    ($param:expr) => {
        $crate::error::Error::CorruptStream(format!("{}", $param).into())
    };
}
