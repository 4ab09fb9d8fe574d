//! Identity binding between a declared resource and its remote object.
//!
//! The binding is an annotation on the declared resource so it stays
//! human-inspectable and independent of the store key. Its value is whatever
//! the adapter uses to address the remote object: a service-assigned id, or a
//! natural key such as a route pattern.

use crate::resource::DeclaredResource;

/// Annotation holding the remote object's identifier.
pub const EXTERNAL_NAME_ANNOTATION: &str = "cfsync.io/external-name";

/// Get the bound identifier, or `""` when unbound.
pub fn external_name(res: &DeclaredResource) -> &str {
    res.metadata
        .annotations
        .get(EXTERNAL_NAME_ANNOTATION)
        .map(String::as_str)
        .unwrap_or("")
}

/// Bind an identifier, overwriting any previous value.
///
/// Binding the empty string clears the binding.
pub fn set_external_name(res: &mut DeclaredResource, id: &str) {
    if id.is_empty() {
        clear_external_name(res);
        return;
    }
    res.metadata
        .annotations
        .insert(EXTERNAL_NAME_ANNOTATION.to_string(), id.to_string());
}

pub fn clear_external_name(res: &mut DeclaredResource) {
    res.metadata.annotations.remove(EXTERNAL_NAME_ANNOTATION);
}

pub fn is_bound(res: &DeclaredResource) -> bool {
    !external_name(res).is_empty()
}
