//! Compiles CLA document field definitions into the provider's tab layout.

use crate::envelope::{CLA_DOCUMENT_ID, SIGNER_RECIPIENT_ID};
use crate::types::{ClaDocument, DocumentTab, TabType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Pre-filled values keyed by `tab_id`.
pub type DefaultValues = BTreeMap<String, String>;

/// Provider tab placement, grouped by field type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tabs {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub text_tabs: Vec<Tab>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub number_tabs: Vec<Tab>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sign_here_tabs: Vec<Tab>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub date_signed_tabs: Vec<Tab>,
}

impl Tabs {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.text_tabs.len()
            + self.number_tabs.len()
            + self.sign_here_tabs.len()
            + self.date_signed_tabs.len()
    }

    pub fn find(&self, tab_id: &str) -> Option<&Tab> {
        self.text_tabs
            .iter()
            .chain(&self.number_tabs)
            .chain(&self.sign_here_tabs)
            .chain(&self.date_signed_tabs)
            .find(|tab| tab.tab_id == tab_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub tab_id: String,
    pub tab_label: String,
    pub document_id: String,
    pub recipient_id: String,
    pub page_number: String,
    pub x_position: String,
    pub y_position: String,
    pub width: String,
    pub height: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_x_offset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_y_offset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_ignore_if_not_present: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<String>,
}

impl Tab {
    fn place(field: &DocumentTab, value: Option<String>) -> Self {
        let anchored = field.anchor_string.is_some();
        Self {
            tab_id: field.tab_id.clone(),
            tab_label: field.label.clone().unwrap_or_else(|| field.tab_id.clone()),
            document_id: CLA_DOCUMENT_ID.to_string(),
            recipient_id: SIGNER_RECIPIENT_ID.to_string(),
            page_number: field.page.to_string(),
            x_position: field.position_x.to_string(),
            y_position: field.position_y.to_string(),
            width: field.width.to_string(),
            height: field.height.to_string(),
            anchor_string: field.anchor_string.clone(),
            anchor_x_offset: field.anchor_x_offset.map(|v| v.to_string()),
            anchor_y_offset: field.anchor_y_offset.map(|v| v.to_string()),
            anchor_units: anchored.then(|| "pixels".to_string()),
            anchor_ignore_if_not_present: anchored
                .then(|| flag(field.anchor_ignore_if_not_present)),
            value,
            required: None,
            locked: None,
            optional: None,
        }
    }
}

fn flag(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

/// Builds the provider tab structure for `document`.
///
/// A value from `defaults` wins over the field's own default. Unknown field
/// types are logged and skipped.
pub fn compile_tabs(document: &ClaDocument, defaults: &DefaultValues) -> Tabs {
    let mut tabs = Tabs::default();

    for field in &document.tabs {
        let value = defaults
            .get(&field.tab_id)
            .cloned()
            .or_else(|| field.default_value.clone());

        match &field.tab_type {
            TabType::Text => {
                let mut tab = Tab::place(field, value);
                tab.required = Some(flag(true));
                tab.locked = Some(flag(tab.value.is_some()));
                tabs.text_tabs.push(tab);
            }
            TabType::TextUnlocked => {
                let mut tab = Tab::place(field, value);
                tab.required = Some(flag(true));
                tab.locked = Some(flag(false));
                tabs.text_tabs.push(tab);
            }
            TabType::TextOptional => {
                let mut tab = Tab::place(field, value);
                tab.required = Some(flag(false));
                tab.locked = Some(flag(false));
                tabs.text_tabs.push(tab);
            }
            TabType::Number => {
                let mut tab = Tab::place(field, value);
                tab.required = Some(flag(true));
                tabs.number_tabs.push(tab);
            }
            TabType::Sign => {
                tabs.sign_here_tabs.push(Tab::place(field, value));
            }
            TabType::SignOptional => {
                let mut tab = Tab::place(field, value);
                tab.optional = Some(flag(true));
                tabs.sign_here_tabs.push(tab);
            }
            TabType::Date => {
                tabs.date_signed_tabs.push(Tab::place(field, value));
            }
            TabType::Unknown(kind) => {
                warn!(
                    document = %document.name,
                    tab_id = %field.tab_id,
                    tab_type = %kind,
                    "skipping unsupported document tab type"
                );
            }
        }
    }

    tabs
}

/// Defaults for an individual agreement.
pub fn individual_defaults(full_name: &str, email: &str) -> DefaultValues {
    let mut values = DefaultValues::new();
    values.insert("full_name".to_string(), full_name.to_string());
    values.insert("public_name".to_string(), full_name.to_string());
    values.insert("email".to_string(), email.to_string());
    values
}

/// Defaults for a corporate agreement.
///
/// The CLA manager fields are only filled when the signer is someone else.
pub fn corporate_defaults(
    corporation: &str,
    signatory_name: &str,
    signatory_email: &str,
    manager: Option<(&str, &str)>,
) -> DefaultValues {
    let mut values = DefaultValues::new();
    values.insert("corporation".to_string(), corporation.to_string());
    values.insert("corporation_name".to_string(), corporation.to_string());
    values.insert("signatory_name".to_string(), signatory_name.to_string());
    values.insert("signatory_email".to_string(), signatory_email.to_string());
    values.insert("email".to_string(), signatory_email.to_string());
    if let Some((manager_name, manager_email)) = manager {
        values.insert("cla_manager_name".to_string(), manager_name.to_string());
        values.insert("cla_manager_email".to_string(), manager_email.to_string());
        values.insert("point_of_contact".to_string(), manager_name.to_string());
    }
    values
}
