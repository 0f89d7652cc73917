//! Presentation state
//!
//! [`ViewModel`] is the observer a renderer sits behind: it folds outcomes
//! into a [`ViewState`] and publishes each new state on a watch channel.
//! The renderer only reads.

use herald_core::{OperationError, Outcome};
use tokio::sync::watch;

use crate::observer::Observer;

/// What a renderer needs to draw one feature
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewState<V> {
    pub loading: bool,
    /// Last successful value, kept while reloading or after a failure
    pub value: Option<V>,
    /// User-facing failure message
    pub error: Option<String>,
}

impl<V> Default for ViewState<V> {
    fn default() -> Self {
        ViewState {
            loading: false,
            value: None,
            error: None,
        }
    }
}

impl<V: Clone> ViewState<V> {
    /// State after `outcome`
    pub fn apply(&self, outcome: &Outcome<V>) -> Self {
        match outcome {
            Outcome::Idle => ViewState::default(),
            Outcome::Pending => ViewState {
                loading: true,
                value: self.value.clone(),
                error: None,
            },
            Outcome::Succeeded(value) => ViewState {
                loading: false,
                value: Some(value.clone()),
                error: None,
            },
            Outcome::Failed(error) => ViewState {
                loading: false,
                value: self.value.clone(),
                error: Some(error_message(error)),
            },
        }
    }
}

/// Message shown for a failed operation
pub fn error_message(error: &OperationError) -> String {
    match error {
        OperationError::Cancelled => "Cancelled".to_string(),
        OperationError::Failed { cause } => format!("Failed: {cause}"),
        OperationError::TimedOut(limit) => {
            format!("Timed out after {}", humantime::format_duration(*limit))
        }
        OperationError::Panicked(_) => "Failed: internal error".to_string(),
    }
}

/// Observer that publishes [`ViewState`] to renderers
pub struct ViewModel<V> {
    state: ViewState<V>,
    tx: watch::Sender<ViewState<V>>,
}

impl<V: Clone> ViewModel<V> {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ViewState::default());
        ViewModel {
            state: ViewState::default(),
            tx,
        }
    }

    /// Receiver for a renderer; always holds the latest state
    pub fn watch(&self) -> watch::Receiver<ViewState<V>> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> &ViewState<V> {
        &self.state
    }
}

impl<V: Clone> Default for ViewModel<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Observer<V> for ViewModel<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn on_outcome(&mut self, outcome: &Outcome<V>) {
        self.state = self.state.apply(outcome);
        self.tx.send_replace(self.state.clone());
    }
}
