//! OpenID 2.0 indirect messages.
//!
//! [`AuthRequest`] is the `checkid_setup` request sent to the provider through
//! a user agent redirect. [`AuthSuccess`] is the positive assertion the
//! provider sends back, with accessors for the attribute exchange extension.

use std::collections::HashMap;

use url::Url;

use crate::OpenIdResult;
use crate::attributes::{AX_NAMESPACE, FetchSpec};
use crate::consumer::{DiscoveryRecord, ResponseParams};
use crate::error::OpenIdError;

/// OpenID 2.0 protocol namespace.
pub const OPENID2_NAMESPACE: &str = "http://specs.openid.net/auth/2.0";

/// Identifier used when the provider should select the user identity.
pub const IDENTIFIER_SELECT: &str = "http://specs.openid.net/auth/2.0/identifier_select";

const AX_ALIAS: &str = "ax";

/// An authentication request bound to an associated discovery record.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    endpoint: Url,
    params: Vec<(String, String)>,
}

impl AuthRequest {
    /// Creates a `checkid_setup` request for `discovered`.
    #[must_use]
    pub fn new(discovered: &DiscoveryRecord, return_to: &Url, realm: &str) -> Self {
        let (claimed_id, identity) = match &discovered.claimed_identifier {
            Some(claimed) => (
                claimed.clone(),
                discovered.delegate.clone().unwrap_or_else(|| claimed.clone()),
            ),
            None => (IDENTIFIER_SELECT.to_string(), IDENTIFIER_SELECT.to_string()),
        };

        let mut request = Self {
            endpoint: discovered.op_endpoint.clone(),
            params: Vec::new(),
        };
        request.set("openid.ns", OPENID2_NAMESPACE);
        request.set("openid.mode", "checkid_setup");
        request.set("openid.claimed_id", claimed_id);
        request.set("openid.identity", identity);
        request.set("openid.return_to", return_to.as_str());
        request.set("openid.realm", realm);
        if let Some(handle) = &discovered.assoc_handle {
            request.set("openid.assoc_handle", handle.clone());
        }
        request
    }

    fn set(&mut self, key: &str, value: impl Into<String>) {
        self.params.push((key.to_string(), value.into()));
    }

    /// Attaches an attribute exchange fetch request.
    ///
    /// An empty specification adds nothing.
    pub fn add_fetch_extension(&mut self, spec: &FetchSpec) {
        if spec.is_empty() {
            return;
        }

        self.set("openid.ns.ax", AX_NAMESPACE);
        self.set("openid.ax.mode", "fetch_request");
        for attr in spec.attributes() {
            self.set(
                &format!("openid.ax.type.{}", attr.alias),
                attr.type_uri.clone(),
            );
        }

        let required: Vec<&str> = spec.required_aliases().collect();
        if !required.is_empty() {
            self.set("openid.ax.required", required.join(","));
        }
        let optional: Vec<&str> = spec.optional_aliases().collect();
        if !optional.is_empty() {
            self.set("openid.ax.if_available", optional.join(","));
        }
    }

    /// Returns the value of a message parameter.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Encodes the request into the endpoint URL for a GET redirect.
    #[must_use]
    pub fn destination_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().extend_pairs(
            self.params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );
        url
    }
}

/// A positive authentication assertion (`id_res`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSuccess {
    params: HashMap<String, String>,
}

impl AuthSuccess {
    /// Builds an assertion from callback parameters.
    ///
    /// Only `openid.*` parameters are kept; for repeated parameters the first
    /// value wins.
    #[must_use]
    pub fn from_params(params: &ResponseParams) -> Self {
        let params = params
            .iter()
            .filter(|(k, _)| k.starts_with("openid."))
            .filter_map(|(k, v)| v.first().map(|first| (k.clone(), first.clone())))
            .collect();
        Self { params }
    }

    /// Sets a single message parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Adds one attribute to an attribute exchange fetch response.
    #[must_use]
    pub fn with_ax_attribute(mut self, alias: &str, type_uri: &str, values: &[&str]) -> Self {
        self.params
            .insert(format!("openid.ns.{AX_ALIAS}"), AX_NAMESPACE.to_string());
        self.params
            .insert(format!("openid.{AX_ALIAS}.mode"), "fetch_response".to_string());
        self.params.insert(
            format!("openid.{AX_ALIAS}.type.{alias}"),
            type_uri.to_string(),
        );
        self.params.insert(
            format!("openid.{AX_ALIAS}.count.{alias}"),
            values.len().to_string(),
        );
        for (i, value) in values.iter().enumerate() {
            self.params.insert(
                format!("openid.{AX_ALIAS}.value.{alias}.{}", i + 1),
                (*value).to_string(),
            );
        }
        self
    }

    /// Returns a message parameter by its full key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns the alias an extension namespace is declared under.
    #[must_use]
    pub fn extension_alias(&self, namespace: &str) -> Option<&str> {
        self.params.iter().find_map(|(k, v)| {
            k.strip_prefix("openid.ns.")
                .filter(|_| v == namespace)
        })
    }

    /// Returns `true` if the message declares the extension namespace.
    #[must_use]
    pub fn has_extension(&self, namespace: &str) -> bool {
        self.extension_alias(namespace).is_some()
    }

    /// Returns the fetched attributes keyed by alias.
    ///
    /// Returns `Ok(None)` when the message carries no attribute exchange
    /// extension. Attributes announced without values map to an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`OpenIdError::Message`] if a value count is not a number or
    /// announces values the message does not carry.
    pub fn attribute_exchange(&self) -> OpenIdResult<Option<HashMap<String, Vec<String>>>> {
        let Some(ns) = self.extension_alias(AX_NAMESPACE) else {
            return Ok(None);
        };
        let type_prefix = format!("openid.{ns}.type.");

        let mut attributes = HashMap::new();
        for key in self.params.keys() {
            let Some(alias) = key.strip_prefix(&type_prefix) else {
                continue;
            };

            let values = match self.get(&format!("openid.{ns}.count.{alias}")) {
                Some(count) => self.counted_values(ns, alias, count)?,
                None => self
                    .get(&format!("openid.{ns}.value.{alias}"))
                    .map(|v| vec![v.to_string()])
                    .unwrap_or_default(),
            };
            attributes.insert(alias.to_string(), values);
        }

        Ok(Some(attributes))
    }

    fn counted_values(&self, ns: &str, alias: &str, count: &str) -> OpenIdResult<Vec<String>> {
        let count: usize = count.parse().map_err(|_| {
            OpenIdError::message(format!("attribute '{alias}' has invalid count '{count}'"))
        })?;
        // Every value is a separate parameter.
        if count > self.params.len() {
            return Err(OpenIdError::message(format!(
                "attribute '{alias}' announces {count} values"
            )));
        }

        (1..=count)
            .map(|i| {
                self.get(&format!("openid.{ns}.value.{alias}.{i}"))
                    .map(String::from)
                    .ok_or_else(|| {
                        OpenIdError::message(format!("attribute '{alias}' is missing value {i}"))
                    })
            })
            .collect()
    }
}
