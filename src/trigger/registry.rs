//! Registry storage and resolution.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::error::RegistryError;

use super::callback::SharedCallback;
use super::catalog::BUILTIN_TRIGGERS;

/// Name of the catch-all trigger returned when nothing else matches.
pub const UNKNOWN_TRIGGER: &str = "UNKNOWN";

/// A named substring marker with an optional bound callback.
#[derive(Clone)]
pub struct TriggerDefinition {
    name: String,
    match_substring: String,
    callback: Option<SharedCallback>,
}

impl TriggerDefinition {
    fn new(name: impl Into<String>, match_substring: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            match_substring: match_substring.into(),
            callback: None,
        }
    }

    fn catch_all() -> Self {
        Self::new(UNKNOWN_TRIGGER, "")
    }

    /// Unique trigger name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Literal substring searched for in messages. Empty for the catch-all.
    #[must_use]
    pub fn match_substring(&self) -> &str {
        &self.match_substring
    }

    /// The bound callback, if any.
    #[must_use]
    pub fn callback(&self) -> Option<&SharedCallback> {
        self.callback.as_ref()
    }

    /// True for the `UNKNOWN` trigger.
    #[must_use]
    pub fn is_catch_all(&self) -> bool {
        self.name == UNKNOWN_TRIGGER
    }

    /// Literal containment test. The catch-all never matches.
    #[must_use]
    pub fn matches(&self, message: &str) -> bool {
        !self.is_catch_all() && message.contains(self.match_substring.as_str())
    }
}

impl fmt::Debug for TriggerDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerDefinition")
            .field("name", &self.name)
            .field("match_substring", &self.match_substring)
            .field("callback", &self.callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

/// Ordered set of triggers with their callbacks.
///
/// Reads and writes go through an internal lock, so one registry can be
/// shared (`Arc`) between the monitor thread and the host that swaps
/// callbacks.
pub struct TriggerRegistry {
    triggers: RwLock<Vec<TriggerDefinition>>,
    unknown: TriggerDefinition,
}

impl Default for TriggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TriggerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerRegistry")
            .field("triggers", &self.triggers())
            .finish_non_exhaustive()
    }
}

impl TriggerRegistry {
    /// An empty registry. Every message resolves to `UNKNOWN`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            triggers: RwLock::new(Vec::new()),
            unknown: TriggerDefinition::catch_all(),
        }
    }

    /// A registry holding the built-in catalog, in catalog order, unbound.
    #[must_use]
    pub fn builtin() -> Self {
        let triggers = BUILTIN_TRIGGERS
            .iter()
            .map(|(name, substring)| TriggerDefinition::new(*name, *substring))
            .collect();
        Self {
            triggers: RwLock::new(triggers),
            unknown: TriggerDefinition::catch_all(),
        }
    }

    /// Appends a trigger after all existing ones.
    ///
    /// # Errors
    ///
    /// - `ReservedName` for `UNKNOWN`
    /// - `EmptySubstring` if `match_substring` is empty
    /// - `DuplicateTrigger` if `name` is already defined
    pub fn define(
        &self,
        name: impl Into<String>,
        match_substring: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let match_substring = match_substring.into();

        if name == UNKNOWN_TRIGGER {
            return Err(RegistryError::ReservedName { name });
        }
        if match_substring.is_empty() {
            return Err(RegistryError::EmptySubstring { name });
        }

        let mut triggers = self.write();
        if triggers.iter().any(|t| t.name == name) {
            return Err(RegistryError::DuplicateTrigger { name });
        }
        triggers.push(TriggerDefinition::new(name, match_substring));
        Ok(())
    }

    /// Binds `callback` to `name`, replacing and returning any previous one.
    ///
    /// # Errors
    ///
    /// `ReservedName` for `UNKNOWN`, `UnknownTrigger` if `name` is not defined.
    pub fn register(
        &self,
        name: &str,
        callback: SharedCallback,
    ) -> Result<Option<SharedCallback>, RegistryError> {
        check_bindable(name)?;
        let mut triggers = self.write();
        let slot = triggers
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| RegistryError::UnknownTrigger {
                name: name.to_string(),
            })?;
        debug!(trigger = %name, replaced = slot.callback.is_some(), "callback registered");
        Ok(slot.callback.replace(callback))
    }

    /// Binds several callbacks at once.
    ///
    /// Every name is checked before anything is bound, so on error the
    /// registry is unchanged.
    ///
    /// # Errors
    ///
    /// The first `register` error any name would produce.
    pub fn register_many<I, S>(&self, bindings: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = (S, SharedCallback)>,
        S: AsRef<str>,
    {
        let bindings: Vec<(S, SharedCallback)> = bindings.into_iter().collect();

        let mut triggers = self.write();
        for (name, _) in &bindings {
            let name = name.as_ref();
            check_bindable(name)?;
            if !triggers.iter().any(|t| t.name == name) {
                return Err(RegistryError::UnknownTrigger {
                    name: name.to_string(),
                });
            }
        }

        for (name, callback) in bindings {
            if let Some(slot) = triggers.iter_mut().find(|t| t.name == name.as_ref()) {
                slot.callback = Some(callback);
            }
        }
        Ok(())
    }

    /// Removes and returns the callback bound to `name`.
    ///
    /// # Errors
    ///
    /// `UnknownTrigger` if `name` is not defined.
    pub fn unregister(&self, name: &str) -> Result<Option<SharedCallback>, RegistryError> {
        let mut triggers = self.write();
        let slot = triggers
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| RegistryError::UnknownTrigger {
                name: name.to_string(),
            })?;
        Ok(slot.callback.take())
    }

    /// Returns the first trigger, in declaration order, whose substring occurs
    /// in `message`, or the `UNKNOWN` trigger.
    #[must_use]
    pub fn resolve(&self, message: &str) -> TriggerDefinition {
        self.read()
            .iter()
            .find(|t| t.matches(message))
            .cloned()
            .unwrap_or_else(|| self.unknown.clone())
    }

    /// Looks up a trigger by name. `UNKNOWN` is always present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<TriggerDefinition> {
        if name == UNKNOWN_TRIGGER {
            return Some(self.unknown.clone());
        }
        self.read().iter().find(|t| t.name == name).cloned()
    }

    /// The callback currently bound to `name`.
    #[must_use]
    pub fn callback(&self, name: &str) -> Option<SharedCallback> {
        self.read()
            .iter()
            .find(|t| t.name == name)
            .and_then(|t| t.callback.clone())
    }

    /// Snapshot of the defined triggers in declaration order (without `UNKNOWN`).
    #[must_use]
    pub fn triggers(&self) -> Vec<TriggerDefinition> {
        self.read().clone()
    }

    /// Number of defined triggers, not counting `UNKNOWN`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// True when only `UNKNOWN` exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<TriggerDefinition>> {
        self.triggers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<TriggerDefinition>> {
        self.triggers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_bindable(name: &str) -> Result<(), RegistryError> {
    if name == UNKNOWN_TRIGGER {
        return Err(RegistryError::ReservedName {
            name: name.to_string(),
        });
    }
    Ok(())
}
