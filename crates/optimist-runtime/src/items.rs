//! Items store - list items and form fields with optimistic updates
//!
//! State atoms:
//! - `items` - list of items, each pending, confirmed or errored
//! - `name`, `live` - form fields carrying their own pending/error flags

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use optimist_core::{Action, OptimistError, OptimistResult};
use optimist_state::{Dispatcher, Mutation};

use crate::{
    Coordinator, RemoteAck, RemoteError, RuntimeConfig, Settlement, SimulatedRemote, Speculation,
};

/// List entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub pending: bool,
    pub error: bool,
}

impl Item {
    /// Confirmed item
    pub fn new(name: impl Into<String>) -> Self {
        Item {
            name: name.into(),
            pending: false,
            error: false,
        }
    }

    pub fn pending(name: impl Into<String>) -> Self {
        Item {
            pending: true,
            ..Item::new(name)
        }
    }

    pub fn errored(name: impl Into<String>) -> Self {
        Item {
            error: true,
            ..Item::new(name)
        }
    }
}

/// Form field with its own update status
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField<T> {
    pub value: T,
    pub error: bool,
    pub pending: bool,
}

impl<T> FormField<T> {
    pub fn new(value: T) -> Self {
        FormField {
            value,
            error: false,
            pending: false,
        }
    }

    fn with_status(self, pending: bool, error: bool) -> Self {
        FormField {
            value: self.value,
            error,
            pending,
        }
    }
}

/// Application state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    pub items: Vec<Item>,
    pub name: FormField<String>,
    pub live: FormField<bool>,
}

impl Default for AppState {
    fn default() -> Self {
        AppState {
            items: Vec::new(),
            name: FormField::new("123".to_string()),
            live: FormField::new(false),
        }
    }
}

impl AppState {
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn pending_items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|item| item.pending)
    }

    pub fn errored_items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|item| item.error)
    }
}

/// Partial form update; absent fields are left alone
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormPatch {
    pub name: Option<FormField<String>>,
    pub live: Option<FormField<bool>>,
}

impl FormPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.live.is_none()
    }

    fn with_status(&self, pending: bool, error: bool) -> FormPatch {
        FormPatch {
            name: self.name.clone().map(|f| f.with_status(pending, error)),
            live: self.live.clone().map(|f| f.with_status(pending, error)),
        }
    }
}

/// Application state transitions
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppMutation {
    AddItem(Item),
    UpdateForm(FormPatch),
}

impl Mutation<AppState> for AppMutation {
    fn kind(&self) -> &'static str {
        match self {
            AppMutation::AddItem(_) => "ADD_ITEM",
            AppMutation::UpdateForm(_) => "UPDATE_FORM",
        }
    }

    fn apply(&self, state: &mut AppState) {
        match self {
            AppMutation::AddItem(item) => state.items.push(item.clone()),
            AppMutation::UpdateForm(patch) => {
                if let Some(name) = &patch.name {
                    state.name = name.clone();
                }
                if let Some(live) = &patch.live {
                    state.live = live.clone();
                }
            }
        }
    }

    fn validate(&self, _state: &AppState) -> OptimistResult<()> {
        let reason = match self {
            AppMutation::AddItem(item) if item.name.trim().is_empty() => "item name is empty",
            AppMutation::AddItem(item) if item.pending && item.error => {
                "item cannot be pending and errored at once"
            }
            AppMutation::UpdateForm(patch) if patch.is_empty() => "form patch is empty",
            _ => return Ok(()),
        };
        Err(OptimistError::InvalidPayload {
            kind: self.kind(),
            reason: reason.to_string(),
        })
    }
}

/// Optimistic item addition
#[derive(Clone, Debug)]
pub struct AddItemIntent {
    pub name: String,
}

impl Speculation<AppMutation> for AddItemIntent {
    type Output = RemoteAck;
    type Error = RemoteError;

    fn pending(&self) -> AppMutation {
        AppMutation::AddItem(Item::pending(self.name.as_str()))
    }

    fn confirmed(&self, _output: &RemoteAck) -> AppMutation {
        AppMutation::AddItem(Item::new(self.name.as_str()))
    }

    fn failed(&self, _error: &RemoteError) -> AppMutation {
        AppMutation::AddItem(Item::errored(self.name.as_str()))
    }
}

/// Optimistic form update
#[derive(Clone, Debug)]
pub struct UpdateFormIntent {
    pub patch: FormPatch,
}

impl Speculation<AppMutation> for UpdateFormIntent {
    type Output = RemoteAck;
    type Error = RemoteError;

    fn pending(&self) -> AppMutation {
        AppMutation::UpdateForm(self.patch.with_status(true, false))
    }

    fn confirmed(&self, _output: &RemoteAck) -> AppMutation {
        AppMutation::UpdateForm(self.patch.with_status(false, false))
    }

    fn failed(&self, _error: &RemoteError) -> AppMutation {
        AppMutation::UpdateForm(self.patch.with_status(false, true))
    }
}

/// Items store: coordinator plus the remote it talks to
#[derive(Clone)]
pub struct ItemsStore {
    coordinator: Coordinator<AppState, AppMutation>,
    remote: SimulatedRemote,
}

impl ItemsStore {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self::with_remote(config, SimulatedRemote::new(config.remote.clone()))
    }

    pub fn with_remote(config: &RuntimeConfig, remote: SimulatedRemote) -> Self {
        let dispatcher = Dispatcher::with_config(AppState::default(), config.ledger.clone());
        ItemsStore {
            coordinator: Coordinator::new(dispatcher),
            remote,
        }
    }

    pub fn coordinator(&self) -> &Coordinator<AppState, AppMutation> {
        &self.coordinator
    }

    pub fn state(&self) -> AppState {
        self.coordinator.state()
    }

    /// Add an item optimistically; it shows as pending until the remote settles
    pub async fn add_item_optimistic(&self, name: impl Into<String>) -> OptimistResult<Settlement> {
        let intent = AddItemIntent { name: name.into() };
        let remote = self.remote.clone();
        let subject = intent.name.clone();
        self.coordinator
            .run(intent, move || async move { remote.update(&subject).await })
            .await
    }

    /// Fire-and-forget [`ItemsStore::add_item_optimistic`]
    pub fn spawn_add_item(&self, name: impl Into<String>) -> JoinHandle<OptimistResult<Settlement>> {
        let intent = AddItemIntent { name: name.into() };
        let remote = self.remote.clone();
        let subject = intent.name.clone();
        self.coordinator
            .spawn(intent, move || async move { remote.update(&subject).await })
    }

    /// Add an item with plain dispatches only.
    ///
    /// Without pending semantics the pending entry is never replaced: once
    /// the remote settles the list holds both the pending entry and the
    /// final one.
    pub async fn add_item_plain(&self, name: impl Into<String>) -> OptimistResult<()> {
        let name = name.into();
        self.coordinator
            .dispatch(Action::plain(AppMutation::AddItem(Item::pending(name.as_str()))))?;

        let final_item = match self.remote.update(&name).await {
            Ok(_) => Item::new(name),
            Err(_) => Item::errored(name),
        };
        self.coordinator
            .dispatch(Action::plain(AppMutation::AddItem(final_item)))?;
        Ok(())
    }

    /// Update form fields optimistically
    pub async fn update_form(&self, patch: FormPatch) -> OptimistResult<Settlement> {
        let remote = self.remote.clone();
        self.coordinator
            .run(UpdateFormIntent { patch }, move || async move {
                remote.update("form").await
            })
            .await
    }
}
