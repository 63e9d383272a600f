//! Lifecycle hooks for pooled resources

use crate::errors::FactoryError;

/// Strategy that creates, prepares and disposes of one kind of pooled resource.
///
/// The pool never calls a hook concurrently for the same resource, but may
/// call hooks for different resources from several threads at once.
///
/// # Examples
///
/// ```
/// use sphinx_pool::{FactoryError, ResourceFactory};
///
/// struct Buffers;
///
/// impl ResourceFactory for Buffers {
///     type Resource = Vec<u8>;
///
///     fn create(&self) -> Result<Vec<u8>, FactoryError> {
///         Ok(Vec::with_capacity(4096))
///     }
///
///     fn passivate(&self, buf: &mut Vec<u8>) -> Result<(), FactoryError> {
///         buf.clear();
///         Ok(())
///     }
/// }
/// ```
pub trait ResourceFactory: Send + Sync + 'static {
    type Resource: Send + 'static;

    /// Build a brand new resource.
    fn create(&self) -> Result<Self::Resource, FactoryError>;

    /// Permanently dispose of a resource.
    fn destroy(&self, resource: Self::Resource) -> Result<(), FactoryError> {
        drop(resource);
        Ok(())
    }

    /// Make an idle resource ready for a caller.
    fn activate(&self, _resource: &mut Self::Resource) -> Result<(), FactoryError> {
        Ok(())
    }

    /// Put a resource back into its dormant state before it rests idle.
    fn passivate(&self, _resource: &mut Self::Resource) -> Result<(), FactoryError> {
        Ok(())
    }

    /// Whether the resource can still be handed out.
    fn validate(&self, _resource: &Self::Resource) -> bool {
        true
    }
}
