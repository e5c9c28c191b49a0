//! Late-initialization helpers.
//!
//! These fill fields the user left unset from the observed remote value and
//! never touch a field that is already set.

use tracing::debug;

/// Fills `field` from `observed` when `field` is unset.
pub fn late_init<T: Clone>(field: &mut Option<T>, observed: Option<&T>) -> bool {
    match (field.as_ref(), observed) {
        (None, Some(value)) => {
            *field = Some(value.clone());
            true
        }
        _ => false,
    }
}

/// Fills a list field from the observed list when unset.
///
/// An empty observed list leaves the field unset, so that absent and empty stay
/// equivalent.
pub fn late_init_list<T: Clone>(field: &mut Option<Vec<T>>, observed: &[T]) -> bool {
    if field.is_some() || observed.is_empty() {
        return false;
    }
    *field = Some(observed.to_vec());
    true
}

/// Late-initializes a list of sub-structs element by element.
///
/// Elements are matched by position, not by any key. When the desired list is
/// unset it is filled with `convert` applied to every observed element. When
/// the lengths differ the field is left alone: positional matching would write
/// values into the wrong elements.
pub fn late_init_positional<T, R>(
    field: &mut Option<Vec<T>>,
    observed: &[R],
    convert: impl Fn(&R) -> T,
    merge: impl Fn(&mut T, &R) -> bool,
) -> bool {
    if field.is_none() {
        if observed.is_empty() {
            return false;
        }
        *field = Some(observed.iter().map(convert).collect());
        return true;
    }
    let Some(desired) = field.as_mut() else {
        return false;
    };

    if desired.len() != observed.len() {
        debug!(
            "Skipping positional late-init: {} desired elements, {} observed",
            desired.len(),
            observed.len()
        );
        return false;
    }

    desired
        .iter_mut()
        .zip(observed)
        .fold(false, |changed, (element, remote)| merge(element, remote) || changed)
}

/// Treats an empty list as absent.
#[must_use]
pub fn normalize_list<T>(list: Option<Vec<T>>) -> Option<Vec<T>> {
    list.filter(|items| !items.is_empty())
}
