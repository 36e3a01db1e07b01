//! State of the admin permissions form.
//!
//! The form keeps a working copy of the admin's permission entries. Edits
//! (add, toggle, remove) only touch that copy; `submit` produces the request
//! for `PUT /api/admins/{id}/permissions` and `apply_save` folds the server's
//! answer back in.

use uuid::Uuid;

use crate::{
    api::handlers::admins::{PermissionEntryInput, SavePermissionsRequest},
    store::{AdminDetail, Permission, PermissionEntry},
};

pub const SAVE_SUCCESS_MESSAGE: &str = "Success. Changes have been saved.";
pub const SELECT_PLACEHOLDER: &str = "--- select ---";
pub const ENTER_KEY: &str = "Enter";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AlertKind {
    Success,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
    /// Only the success alert can be closed.
    pub dismissible: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub disabled: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryRow {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
    pub toggle_icon: &'static str,
}

/// Everything needed to render the form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionsView {
    pub alerts: Vec<Alert>,
    pub selected: String,
    /// Headed by the empty placeholder option.
    pub options: Vec<SelectOption>,
    /// Sorted by lowercased permission name.
    pub entries: Vec<EntryRow>,
    /// Render the "none" marker instead of rows.
    pub show_none: bool,
    pub controls_disabled: bool,
    pub show_spinner: bool,
}

#[derive(Clone, Debug)]
pub struct PermissionsForm {
    admin_id: Uuid,
    entries: Vec<PermissionEntry>,
    options: Vec<Permission>,
    selected: String,
    loading: bool,
    error: Option<String>,
    show_save_success: bool,
}

impl PermissionsForm {
    #[must_use]
    pub fn new(admin: &AdminDetail, options: Vec<Permission>) -> Self {
        Self {
            admin_id: admin.id,
            entries: admin.permission_entries.clone(),
            options,
            selected: String::new(),
            loading: false,
            error: None,
            show_save_success: false,
        }
    }

    #[must_use]
    pub fn admin_id(&self) -> Uuid {
        self.admin_id
    }

    #[must_use]
    pub fn entries(&self) -> &[PermissionEntry] {
        &self.entries
    }

    #[must_use]
    pub fn loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn show_save_success(&self) -> bool {
        self.show_save_success
    }

    /// Mirror the select element's value.
    pub fn select(&mut self, value: &str) {
        self.selected = value.to_string();
    }

    /// Append the selected permission as a new active entry.
    ///
    /// Returns `false` without changing anything when nothing is selected, the
    /// value matches no option, or the permission is already present.
    pub fn add_selected(&mut self) -> bool {
        if self.selected.is_empty() {
            return false;
        }
        let Some(permission) = self
            .options
            .iter()
            .find(|option| option.id.to_string() == self.selected)
            .cloned()
        else {
            return false;
        };
        if self.has_permission(permission.id) {
            return false;
        }
        self.entries.push(PermissionEntry {
            id: Uuid::now_v7(),
            admin_id: self.admin_id,
            permission_id: permission.id,
            active: true,
            permission,
        });
        self.selected.clear();
        true
    }

    /// Enter adds the selection; returns whether the key was consumed.
    pub fn key_down(&mut self, key: &str) -> bool {
        if key != ENTER_KEY {
            return false;
        }
        self.add_selected();
        true
    }

    pub fn toggle(&mut self, entry_id: Uuid) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == entry_id) {
            Some(entry) => {
                entry.active = !entry.active;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, entry_id: Uuid) -> bool {
        match self.entries.iter().position(|entry| entry.id == entry_id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Build the save request and enter the loading state.
    pub fn submit(&mut self) -> SavePermissionsRequest {
        self.loading = true;
        SavePermissionsRequest {
            permission_entries: self
                .entries
                .iter()
                .map(|entry| PermissionEntryInput {
                    id: entry.id,
                    admin_id: entry.admin_id,
                    permission_id: entry.permission_id,
                    active: entry.active,
                    permission: Some(entry.permission.clone()),
                })
                .collect(),
        }
    }

    /// Fold the outcome of a save into the form.
    pub fn apply_save(&mut self, result: Result<AdminDetail, String>) {
        self.loading = false;
        match result {
            Ok(admin) => {
                self.entries = admin.permission_entries;
                self.error = None;
                self.show_save_success = true;
            }
            Err(message) => {
                self.error = Some(message);
                self.show_save_success = false;
            }
        }
    }

    pub fn dismiss_success(&mut self) {
        self.show_save_success = false;
    }

    #[must_use]
    pub fn view(&self) -> PermissionsView {
        let mut alerts = Vec::new();
        if self.show_save_success {
            alerts.push(Alert {
                kind: AlertKind::Success,
                message: SAVE_SUCCESS_MESSAGE.to_string(),
                dismissible: true,
            });
        }
        if let Some(error) = &self.error {
            alerts.push(Alert {
                kind: AlertKind::Danger,
                message: error.clone(),
                dismissible: false,
            });
        }

        let mut entries: Vec<EntryRow> = self
            .entries
            .iter()
            .map(|entry| EntryRow {
                id: entry.id,
                name: entry.permission.name.clone(),
                active: entry.active,
                toggle_icon: if entry.active {
                    "fa fa-toggle-on"
                } else {
                    "fa fa-toggle-off"
                },
            })
            .collect();
        entries.sort_by_cached_key(|row| row.name.to_lowercase());

        let mut options = vec![SelectOption {
            value: String::new(),
            label: SELECT_PLACEHOLDER.to_string(),
            disabled: false,
        }];
        options.extend(self.options.iter().map(|permission| SelectOption {
            value: permission.id.to_string(),
            label: permission.name.clone(),
            disabled: self.has_permission(permission.id),
        }));

        PermissionsView {
            alerts,
            selected: self.selected.clone(),
            options,
            show_none: entries.is_empty(),
            entries,
            controls_disabled: self.loading,
            show_spinner: self.loading,
        }
    }

    fn has_permission(&self, permission_id: Uuid) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.permission_id == permission_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permission(name: &str) -> Permission {
        Permission {
            id: Uuid::now_v7(),
            name: name.to_string(),
        }
    }

    fn form_with(existing: &[(&Permission, bool)], options: Vec<Permission>) -> PermissionsForm {
        let admin_id = Uuid::now_v7();
        let admin = AdminDetail {
            id: admin_id,
            name: "Ops".to_string(),
            user: None,
            groups: Vec::new(),
            permission_entries: existing
                .iter()
                .map(|(permission, active)| PermissionEntry {
                    id: Uuid::now_v7(),
                    admin_id,
                    permission_id: permission.id,
                    active: *active,
                    permission: (*permission).clone(),
                })
                .collect(),
        };
        PermissionsForm::new(&admin, options)
    }

    #[test]
    fn add_selected_appends_active_entry_and_clears_selection() {
        let read = permission("reports.read");
        let mut form = form_with(&[], vec![read.clone()]);

        form.select(&read.id.to_string());
        assert!(form.add_selected());

        assert_eq!(form.entries().len(), 1);
        let entry = &form.entries()[0];
        assert!(entry.active);
        assert_eq!(entry.admin_id, form.admin_id());
        assert_eq!(entry.permission, read);
        assert_eq!(form.view().selected, "");
    }

    #[test]
    fn add_selected_ignores_empty_unknown_and_duplicate() {
        let read = permission("reports.read");
        let mut form = form_with(&[(&read, false)], vec![read.clone()]);

        assert!(!form.add_selected());

        form.select(&Uuid::now_v7().to_string());
        assert!(!form.add_selected());

        form.select(&read.id.to_string());
        assert!(!form.add_selected());
        assert_eq!(form.entries().len(), 1);
    }

    #[test]
    fn enter_key_adds_and_is_consumed() {
        let read = permission("reports.read");
        let mut form = form_with(&[], vec![read.clone()]);
        form.select(&read.id.to_string());

        assert!(!form.key_down("a"));
        assert!(form.entries().is_empty());

        assert!(form.key_down(ENTER_KEY));
        assert_eq!(form.entries().len(), 1);

        // Consumed even when there is nothing left to add.
        assert!(form.key_down(ENTER_KEY));
        assert_eq!(form.entries().len(), 1);
    }

    #[test]
    fn toggle_and_remove() {
        let read = permission("reports.read");
        let mut form = form_with(&[(&read, true)], vec![read.clone()]);
        let id = form.entries()[0].id;

        assert!(form.toggle(id));
        assert!(!form.entries()[0].active);
        assert_eq!(form.view().entries[0].toggle_icon, "fa fa-toggle-off");
        assert!(form.toggle(id));
        assert_eq!(form.view().entries[0].toggle_icon, "fa fa-toggle-on");

        assert!(!form.toggle(Uuid::now_v7()));
        assert!(form.remove(id));
        assert!(!form.remove(id));
        assert!(form.view().show_none);
    }

    #[test]
    fn view_sorts_rows_and_disables_present_options() {
        let alpha = permission("alpha");
        let beta = permission("Beta");
        let gamma = permission("gamma");
        let form = form_with(
            &[(&gamma, true), (&alpha, true), (&beta, false)],
            vec![alpha.clone(), beta.clone(), gamma.clone(), permission("delta")],
        );
        let view = form.view();

        let names: Vec<&str> = view.entries.iter().map(|row| row.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "Beta", "gamma"]);
        assert!(!view.show_none);

        assert_eq!(view.options[0].label, SELECT_PLACEHOLDER);
        assert_eq!(view.options[0].value, "");
        let disabled: Vec<bool> = view.options.iter().map(|option| option.disabled).collect();
        assert_eq!(disabled, vec![false, true, true, true, false]);
        assert!(view.alerts.is_empty());
    }

    #[test]
    fn submit_and_successful_save() {
        let read = permission("reports.read");
        let write = permission("reports.write");
        let mut form = form_with(&[(&read, true)], vec![read.clone(), write.clone()]);
        form.select(&write.id.to_string());
        form.add_selected();

        let request = form.submit();
        assert!(form.loading());
        assert!(form.view().controls_disabled);
        assert_eq!(request.permission_entries.len(), 2);
        assert!(request
            .permission_entries
            .iter()
            .all(|entry| entry.admin_id == form.admin_id()));

        let saved = AdminDetail {
            id: form.admin_id(),
            name: "Ops".to_string(),
            user: None,
            groups: Vec::new(),
            permission_entries: form.entries().to_vec(),
        };
        form.apply_save(Ok(saved));
        assert!(!form.loading());
        assert!(form.show_save_success());
        let view = form.view();
        assert_eq!(view.alerts.len(), 1);
        assert_eq!(view.alerts[0].kind, AlertKind::Success);
        assert_eq!(view.alerts[0].message, SAVE_SUCCESS_MESSAGE);

        form.dismiss_success();
        assert!(form.view().alerts.is_empty());
    }

    #[test]
    fn failed_save_shows_danger_alert() {
        let mut form = form_with(&[], Vec::new());
        form.submit();
        form.apply_save(Err("Unknown permission.".to_string()));

        assert!(!form.loading());
        assert_eq!(form.error(), Some("Unknown permission."));
        let view = form.view();
        assert_eq!(
            view.alerts,
            vec![Alert {
                kind: AlertKind::Danger,
                message: "Unknown permission.".to_string(),
                dismissible: false,
            }]
        );
        assert!(!view.controls_disabled);
    }
}
