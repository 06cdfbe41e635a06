//! Data filtering and smoothing.

pub mod ema;

/// A filter for values of type `V`.
///
/// The filter history lives in a separate [`Filter::State`] value, so one filter configuration can
/// be shared across several independently-filtered series.
pub trait Filter<V> {
    /// The mutable state needed to filter a series of values.
    type State: Default;

    /// Adds a new value to the series, returning the filtered value.
    fn filter(&self, state: &mut Self::State, value: V) -> V;
}
