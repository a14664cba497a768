use crate::res::ResourceId;

#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "{}", _0)]
    IO(::std::io::Error),
    #[fail(display = "{}", _0)]
    Bincode(::bincode::Error),
    #[fail(display = "{}", _0)]
    Json(::serde_json::Error),
    #[fail(display = "{}", _0)]
    Malformed(String),
    #[fail(display = "{} is invalid.", _0)]
    InvalidHandle(ResourceId),
    #[fail(display = "{} refers to a resource that has been released.", _0)]
    Stale(ResourceId),
    #[fail(display = "{} is still loading.", _0)]
    NotReady(ResourceId),
    #[fail(display = "{} failed to load.", _0)]
    LoadFailed(ResourceId),
    #[fail(display = "{} is still shared with readers.", _0)]
    Busy(ResourceId),
    #[fail(display = "{} holds a {:?} resource, not {:?}.", id, found, expected)]
    KindMismatch {
        id: ResourceId,
        expected: crate::res::ResourceKind,
        found: crate::res::ResourceKind,
    },
    #[fail(display = "Could not find resource '{}'.", _0)]
    NotFound(String),
    #[fail(display = "Out of memory while allocating {} bytes.", _0)]
    OutOfMemory(usize),
    #[fail(display = "Decompression failed: {}.", _0)]
    Decompression(String),
    #[fail(display = "'{}' is compressed and can not be accessed as a raw file.", _0)]
    Compressed(String),
    #[fail(display = "Package: {}", _0)]
    Package(String),
}

pub type Result<T> = ::std::result::Result<T, Error>;

impl From<::std::io::Error> for Error {
    fn from(err: ::std::io::Error) -> Self {
        Error::IO(err)
    }
}

impl From<::bincode::Error> for Error {
    fn from(err: ::bincode::Error) -> Self {
        Error::Bincode(err)
    }
}

impl From<::serde_json::Error> for Error {
    fn from(err: ::serde_json::Error) -> Self {
        Error::Json(err)
    }
}
