use http::Extensions;
use tokio_util::sync::CancellationToken;

/// Cancellation signal plus a bag of typed values.
///
/// Broker backends read their own settings out of the context attached to [`Options`] and
/// [`SubscribeOptions`], keyed by type, so the generic option structs never need to know about
/// backend specifics.
///
/// [`Options`]: crate::Options
/// [`SubscribeOptions`]: crate::SubscribeOptions
#[derive(Clone, Debug, Default)]
pub struct Context {
    cancel: CancellationToken,
    values: Extensions,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context cancelled through the given token
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            values: Extensions::new(),
        }
    }

    /// Store a value, replacing any previous value of the same type
    #[must_use]
    pub fn with_value<T>(mut self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.values.insert(value);
        self
    }

    /// Store a value in place, returning the previous value of the same type
    pub fn insert<T>(&mut self, value: T) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.values.insert(value)
    }

    /// Look up the value stored for type `T`
    pub fn value<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values.get::<T>()
    }

    /// A context carrying the same values whose cancellation is also triggered by this one
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            values: self.values.clone(),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the context is cancelled
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}
