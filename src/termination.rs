//! Defines the [`Termination`] trait.

use std::{convert::Infallible, fmt::Debug, process};

/// This trait extends the [`std::process::Termination`] trait for use in headcount.
///
/// The winit event loop owns the main thread and never returns, so the process exit status has to
/// be derived from the value the application closure returns on its own thread. This trait lets
/// [`gui::run`][crate::gui::run] inspect that value before exiting the process.
pub trait Termination: process::Termination {
    fn is_success(&self) -> bool;
}

impl Termination for Infallible {
    fn is_success(&self) -> bool {
        match *self {}
    }
}

impl Termination for () {
    fn is_success(&self) -> bool {
        true
    }
}

impl<T: Termination, E: Debug> Termination for Result<T, E> {
    fn is_success(&self) -> bool {
        match self {
            Ok(term) => term.is_success(),
            Err(_) => false,
        }
    }
}
