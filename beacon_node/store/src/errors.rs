use ssz::DecodeError;
use types::Hash256;

#[derive(Debug, PartialEq)]
pub enum Error {
    SszDecodeError(DecodeError),
    MissingBlock(Hash256),
    MissingState(Hash256),
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::SszDecodeError(e)
    }
}
