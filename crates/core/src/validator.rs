use std::collections::{BTreeMap, BTreeSet};

use crate::domain::ids::RoleId;
use crate::domain::menu::{BindingEntry, Bindings};
use crate::domain::symbol::ReactionSymbol;
use crate::errors::ValidationError;

/// Bindings of a proposed menu, in the order the operator supplied them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingList {
    entries: Vec<BindingEntry>,
}

impl BindingList {
    pub fn entries(&self) -> &[BindingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Collapses to one role per symbol; a repeated symbol keeps its last role.
    pub fn into_map(self) -> Bindings {
        self.entries.into_iter().map(|entry| (entry.symbol, entry.role_id)).collect()
    }

    /// Symbols that appear more than once, each listed once.
    pub fn duplicate_symbols(&self) -> Vec<ReactionSymbol> {
        let mut counts: BTreeMap<&ReactionSymbol, usize> = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(&entry.symbol).or_default() += 1;
        }
        counts.into_iter().filter(|(_, count)| *count > 1).map(|(symbol, _)| symbol.clone()).collect()
    }

    /// Distinct symbols in first-seen order, one reaction affordance each.
    pub fn distinct_symbols(&self) -> Vec<ReactionSymbol> {
        let mut seen = BTreeSet::new();
        self.entries
            .iter()
            .filter(|entry| seen.insert(entry.symbol.clone()))
            .map(|entry| entry.symbol.clone())
            .collect()
    }
}

/// Checks a proposed menu definition before anything is rendered or persisted.
pub fn validate<S>(roles: &[RoleId], symbols: &[S]) -> Result<BindingList, ValidationError>
where
    S: AsRef<str>,
{
    if roles.is_empty() || symbols.is_empty() {
        return Err(ValidationError::EmptyMenu);
    }
    if roles.len() != symbols.len() {
        return Err(ValidationError::CountMismatch { roles: roles.len(), symbols: symbols.len() });
    }

    let entries = roles
        .iter()
        .zip(symbols)
        .enumerate()
        .map(|(index, (role_id, raw))| {
            let symbol = ReactionSymbol::parse(raw.as_ref())
                .filter(|symbol| !symbol.is_shortcode())
                .ok_or(ValidationError::InvalidSymbol { position: index + 1 })?;
            Ok(BindingEntry { symbol, role_id: *role_id })
        })
        .collect::<Result<Vec<_>, ValidationError>>()?;

    Ok(BindingList { entries })
}
