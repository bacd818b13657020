//! Attribute exchange schema mapping and fetch specifications.
//!
//! Application-level attribute names (`email`, `fullname`, ...) are mapped to
//! the `axschema.org` type URIs understood by OpenID providers. The resulting
//! [`FetchSpec`] is built once at processor initialization and attached to
//! every authentication request.

use serde::{Deserialize, Serialize};

use crate::error::OpenIdError;

/// Attribute exchange namespace URI.
pub const AX_NAMESPACE: &str = "http://openid.net/srv/ax/1.0";

const AX_SCHEMA: &[(&str, &str)] = &[
    ("nickname", "http://axschema.org/namePerson/friendly"),
    ("email", "http://axschema.org/contact/email"),
    ("fullname", "http://axschema.org/namePerson"),
    ("prefix", "http://axschema.org/namePerson/prefix"),
    ("firstname", "http://axschema.org/namePerson/first"),
    ("middlename", "http://axschema.org/namePerson/middle"),
    ("lastname", "http://axschema.org/namePerson/last"),
    ("suffix", "http://axschema.org/namePerson/suffix"),
    ("dob", "http://axschema.org/birthDate"),
    ("birthyear", "http://axschema.org/birthDate/birthYear"),
    ("gender", "http://axschema.org/person/gender"),
    ("postcode", "http://axschema.org/contact/postalCode/home"),
    ("country", "http://axschema.org/contact/country/home"),
    ("city", "http://axschema.org/contact/city/home"),
    ("phone", "http://axschema.org/contact/phone/default"),
    ("language", "http://axschema.org/pref/language"),
    ("timezone", "http://axschema.org/pref/timezone"),
    ("company", "http://axschema.org/company/name"),
    ("jobtitle", "http://axschema.org/company/title"),
    ("image", "http://axschema.org/media/image/default"),
    ("website", "http://axschema.org/contact/web/default"),
];

/// Resolves an attribute alias to its attribute exchange type URI.
#[must_use]
pub fn type_uri(alias: &str) -> Option<&'static str> {
    AX_SCHEMA
        .iter()
        .find(|(name, _)| *name == alias)
        .map(|(_, uri)| *uri)
}

/// Splits a configured attribute list on whitespace and commas.
#[must_use]
pub fn tokenize(list: &str) -> Vec<&str> {
    list.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect()
}

/// A single attribute requested from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchAttribute {
    /// Alias used in the fetch request and in the returned attribute map.
    pub alias: String,
    /// Attribute exchange type URI.
    pub type_uri: String,
    /// Whether the provider is asked to treat the attribute as required.
    pub required: bool,
}

/// Ordered set of attributes requested with every authentication request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSpec {
    attributes: Vec<FetchAttribute>,
}

impl FetchSpec {
    /// Builds the fetch specification from configured attribute lists.
    ///
    /// Optional aliases without a known type are logged and skipped. A
    /// required alias without a known type would produce a fetch request the
    /// provider cannot honour, so it is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`OpenIdError::Configuration`] for an unknown required alias.
    pub fn build(required: &str, optional: &str) -> Result<Self, OpenIdError> {
        let mut spec = Self::default();

        for alias in tokenize(required) {
            let uri = type_uri(alias).ok_or_else(|| {
                OpenIdError::configuration(format!(
                    "no attribute type known for required attribute '{alias}'"
                ))
            })?;
            spec.push(alias, uri, true);
        }

        for alias in tokenize(optional) {
            match type_uri(alias) {
                Some(uri) => spec.push(alias, uri, false),
                None => {
                    tracing::warn!("No attribute type known for optional attribute '{}'", alias);
                }
            }
        }

        Ok(spec)
    }

    fn push(&mut self, alias: &str, uri: &str, required: bool) {
        if self.attributes.iter().any(|a| a.alias == alias) {
            return;
        }
        self.attributes.push(FetchAttribute {
            alias: alias.to_string(),
            type_uri: uri.to_string(),
            required,
        });
    }

    /// Returns all attributes in request order.
    #[must_use]
    pub fn attributes(&self) -> &[FetchAttribute] {
        &self.attributes
    }

    /// Returns the number of requested attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns `true` if no attributes are requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Aliases of required attributes, in order.
    pub fn required_aliases(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .filter(|a| a.required)
            .map(|a| a.alias.as_str())
    }

    /// Aliases of optional attributes, in order.
    pub fn optional_aliases(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .filter(|a| !a.required)
            .map(|a| a.alias.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_uri_lookup() {
        assert_eq!(type_uri("email"), Some("http://axschema.org/contact/email"));
        assert_eq!(type_uri("fullname"), Some("http://axschema.org/namePerson"));
        assert_eq!(type_uri("shoe_size"), None);
    }

    #[test]
    fn test_tokenize_commas_and_whitespace() {
        assert_eq!(tokenize("email,fullname"), vec!["email", "fullname"]);
        assert_eq!(
            tokenize(" email ,  fullname\tlanguage\n"),
            vec!["email", "fullname", "language"]
        );
        assert!(tokenize("").is_empty());
        assert!(tokenize(" , ,").is_empty());
    }

    #[test]
    fn test_build_required_and_optional() {
        let spec = FetchSpec::build("email,fullname", "language").unwrap();
        assert_eq!(spec.len(), 3);

        let attrs = spec.attributes();
        assert_eq!(attrs[0].alias, "email");
        assert!(attrs[0].required);
        assert_eq!(attrs[0].type_uri, type_uri("email").unwrap());
        assert_eq!(attrs[1].alias, "fullname");
        assert!(attrs[1].required);
        assert_eq!(attrs[2].alias, "language");
        assert!(!attrs[2].required);
        assert_eq!(attrs[2].type_uri, type_uri("language").unwrap());

        assert_eq!(
            spec.required_aliases().collect::<Vec<_>>(),
            vec!["email", "fullname"]
        );
        assert_eq!(spec.optional_aliases().collect::<Vec<_>>(), vec!["language"]);
    }

    #[test]
    fn test_unknown_optional_attribute_is_skipped() {
        let spec = FetchSpec::build("email", "language shoe_size").unwrap();
        assert_eq!(spec.len(), 2);
        assert!(spec.attributes().iter().all(|a| a.alias != "shoe_size"));
    }

    #[test]
    fn test_unknown_required_attribute_fails() {
        // Adding it with no type would yield a malformed fetch request.
        let err = FetchSpec::build("email,shoe_size", "").unwrap_err();
        assert!(matches!(err, OpenIdError::Configuration { .. }));
        assert!(err.to_string().contains("shoe_size"));
    }

    #[test]
    fn test_duplicate_aliases_keep_first() {
        let spec = FetchSpec::build("email email", "email language").unwrap();
        assert_eq!(spec.len(), 2);
        assert!(spec.attributes()[0].required);
    }

    #[test]
    fn test_empty_lists() {
        let spec = FetchSpec::build("", "").unwrap();
        assert!(spec.is_empty());
    }
}
