//
// error.rs --- Emulator error type.
//
// Released under the "BSD3" license. See the file "LICENSE"
// for details.
//

use std::error;
use std::fmt;
use std::io;
use std::num;
use std::result;

#[derive(Debug)]
pub enum Error {
    IO(io::Error),
    Ihex(ihex::ReaderError),
    Parse(num::ParseIntError),
}

pub type Result<T> = result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::IO(ref err) => write!(f, "IO error: {}", err),
            Error::Ihex(ref err) => write!(f, "Invalid HEX image: {}", err),
            Error::Parse(ref err) => write!(f, "Invalid number: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IO(ref err) => Some(err),
            Error::Ihex(ref err) => Some(err),
            Error::Parse(ref err) => Some(err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IO(err)
    }
}

impl From<ihex::ReaderError> for Error {
    fn from(err: ihex::ReaderError) -> Error {
        Error::Ihex(err)
    }
}

impl From<num::ParseIntError> for Error {
    fn from(err: num::ParseIntError) -> Error {
        Error::Parse(err)
    }
}
