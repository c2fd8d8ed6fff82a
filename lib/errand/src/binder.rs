//! Deferred result of an agent call.

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::{Error, Result, from_json};

/// Outcome of one [`Agent::request`](crate::Agent::request): either the
/// extracted payload or the error that stopped the pipeline.
///
/// Nothing is decoded until [`Binder::bind`] or [`Binder::bind_into`].
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use errand::Binder;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     name: String,
/// }
///
/// let binder = Binder::from(Ok(Bytes::from_static(br#"{"name":"tom"}"#)));
/// let user: User = binder.bind().expect("decode");
/// assert_eq!(user.name, "tom");
/// ```
///
/// The destination of [`Binder::bind_into`] must be a mutable reference;
/// anything else is refused at compile time:
///
/// ```compile_fail
/// # use errand::Binder;
/// let binder = Binder::from(Ok(bytes::Bytes::from_static(b"1")));
/// let value = 0_u32;
/// binder.bind_into(value).expect("decode");
/// ```
#[derive(Debug)]
#[must_use = "a binder holds the outcome of the call"]
pub struct Binder {
    outcome: Result<Bytes>,
}

impl Binder {
    /// Decode the payload as JSON, or return the stored error untouched.
    ///
    /// # Errors
    ///
    /// The error of the call if it failed, otherwise
    /// [`Error::JsonDeserialization`] naming the offending field.
    pub fn bind<T: DeserializeOwned>(self) -> Result<T> {
        let data = self.outcome?;
        from_json(&data)
    }

    /// Decode the payload into an existing destination.
    ///
    /// The destination is left untouched on error. Use an `Option<T>`
    /// destination to let `null` clear it.
    ///
    /// # Errors
    ///
    /// Same as [`Binder::bind`].
    pub fn bind_into<T: DeserializeOwned>(self, destination: &mut T) -> Result<()> {
        *destination = self.bind()?;
        Ok(())
    }

    /// The stored error, without decoding anything.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        self.outcome.as_ref().err()
    }

    /// Whether the call succeeded.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The raw extracted payload.
    ///
    /// # Errors
    ///
    /// The error of the call if it failed.
    pub fn into_bytes(self) -> Result<Bytes> {
        self.outcome
    }
}

impl From<Result<Bytes>> for Binder {
    fn from(outcome: Result<Bytes>) -> Self {
        Self { outcome }
    }
}
