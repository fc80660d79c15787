//! Read-only service SAS URLs for individual blobs.
//!
//! String-to-sign for signed version 2020-10-02 (one field per line):
//!
//! ```text
//! signedPermissions      r
//! signedStart            YYYY-MM-DDTHH:MM:SSZ
//! signedExpiry           YYYY-MM-DDTHH:MM:SSZ
//! canonicalizedResource  /blob/<account>/<container>/<blob>
//! signedIdentifier
//! signedIP
//! signedProtocol         https
//! signedVersion          2020-10-02
//! signedResource         b
//! signedSnapshotTime
//! rscc
//! rscd
//! rsce
//! rscl
//! rsct
//! ```

use chrono::{DateTime, Duration, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use super::azure::blob_url;
use super::shared_key::{SharedKeyCredential, API_VERSION};
use crate::errors::SearchError;

/// Encode set for SAS query values: everything except unreserved characters.
const QUERY_VALUE_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const SIGNED_PERMISSIONS: &str = "r";
const SIGNED_RESOURCE_BLOB: &str = "b";

/// Builds time-limited download URLs signed with the account key.
#[derive(Debug, Clone)]
pub struct SasUrlGenerator {
    credential: SharedKeyCredential,
    endpoint: String,
    validity: Duration,
    start_skew: Duration,
}

impl SasUrlGenerator {
    /// `endpoint` is the blob service base URL (no trailing slash).
    pub fn new(credential: SharedKeyCredential, endpoint: impl Into<String>) -> Self {
        Self {
            credential,
            endpoint: endpoint.into(),
            validity: Duration::minutes(60),
            start_skew: Duration::minutes(5),
        }
    }

    /// Set how long after signing the URL stays valid.
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Set how far before signing the URL becomes valid.
    pub fn with_start_skew(mut self, start_skew: Duration) -> Self {
        self.start_skew = start_skew;
        self
    }

    /// `https` for TLS endpoints; plain-http endpoints must also allow http.
    fn signed_protocol(&self) -> &'static str {
        if self.endpoint.starts_with("https://") {
            "https"
        } else {
            "https,http"
        }
    }

    /// The exact string signed for `blob_name` over `[start, expiry]`.
    pub fn string_to_sign(
        &self,
        container: &str,
        blob_name: &str,
        start: &str,
        expiry: &str,
    ) -> String {
        let canonicalized_resource = format!(
            "/blob/{}/{}/{}",
            self.credential.account(),
            container,
            blob_name
        );
        [
            SIGNED_PERMISSIONS,
            start,
            expiry,
            canonicalized_resource.as_str(),
            "", // signedIdentifier
            "", // signedIP
            self.signed_protocol(),
            API_VERSION,
            SIGNED_RESOURCE_BLOB,
            "", // signedSnapshotTime
            "", // rscc
            "", // rscd
            "", // rsce
            "", // rscl
            "", // rsct
        ]
        .join("\n")
    }

    /// SAS query string (without the leading `?`) valid around `now`.
    pub fn token(
        &self,
        container: &str,
        blob_name: &str,
        now: DateTime<Utc>,
    ) -> Result<String, SearchError> {
        let window_error = || SearchError::configuration("SAS validity window is out of range");
        let start = now
            .checked_sub_signed(self.start_skew)
            .ok_or_else(window_error)?;
        let expiry = now
            .checked_add_signed(self.validity)
            .ok_or_else(window_error)?;
        let start = format_sas_time(start);
        let expiry = format_sas_time(expiry);
        let signature = self
            .credential
            .sign(&self.string_to_sign(container, blob_name, &start, &expiry))?;

        Ok(format!(
            "sv={}&st={}&se={}&sr={}&sp={}&spr={}&sig={}",
            encode(API_VERSION),
            encode(&start),
            encode(&expiry),
            SIGNED_RESOURCE_BLOB,
            SIGNED_PERMISSIONS,
            encode(self.signed_protocol()),
            encode(&signature),
        ))
    }

    /// Blob URL with a SAS token appended.
    pub fn url(
        &self,
        container: &str,
        blob_name: &str,
        now: DateTime<Utc>,
    ) -> Result<String, SearchError> {
        let token = self.token(container, blob_name, now)?;
        Ok(format!(
            "{}?{}",
            blob_url(&self.endpoint, container, blob_name),
            token
        ))
    }
}

fn format_sas_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, QUERY_VALUE_ENCODE_SET).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

    fn generator() -> SasUrlGenerator {
        SasUrlGenerator::new(
            SharedKeyCredential::new("acct", KEY).unwrap(),
            "https://acct.blob.core.windows.net",
        )
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_string_to_sign_field_order() {
        let sts = generator().string_to_sign(
            "documents",
            "ACC1/report.pdf",
            "2024-01-01T11:55:00Z",
            "2024-01-01T13:00:00Z",
        );
        assert_eq!(
            sts,
            "r\n2024-01-01T11:55:00Z\n2024-01-01T13:00:00Z\n/blob/acct/documents/ACC1/report.pdf\n\n\nhttps\n2020-10-02\nb\n\n\n\n\n\n"
        );
    }

    #[test]
    fn test_golden_token() {
        let token = generator()
            .token("documents", "ACC1/report.pdf", noon())
            .unwrap();
        assert_eq!(
            token,
            "sv=2020-10-02&st=2024-01-01T11%3A55%3A00Z&se=2024-01-01T13%3A00%3A00Z&sr=b&sp=r&spr=https&sig=TgAX2LuAD8q4xI7D2pUBzT60AjUJi%2F%2BEc19V3FGPePo%3D"
        );
    }

    #[test]
    fn test_window_honours_custom_durations() {
        let token = generator()
            .with_validity(Duration::minutes(15))
            .with_start_skew(Duration::minutes(1))
            .token("documents", "a.pdf", noon())
            .unwrap();
        assert!(token.contains("st=2024-01-01T11%3A59%3A00Z"));
        assert!(token.contains("se=2024-01-01T12%3A15%3A00Z"));
    }

    #[test]
    fn test_window_past_calendar_range_is_error() {
        let err = generator()
            .with_validity(Duration::days(365 * 1_000_000))
            .token("documents", "a.pdf", noon())
            .unwrap_err();
        assert!(matches!(err, SearchError::Configuration { .. }));
    }

    #[test]
    fn test_url_shape() {
        let url = generator()
            .url("documents", "ACC1 scan.pdf", noon())
            .unwrap();
        assert!(url.starts_with("https://acct.blob.core.windows.net/documents/ACC1%20scan.pdf?sv="));
        assert!(url.contains("&sr=b&sp=r&spr=https&sig="));
    }

    #[test]
    fn test_http_endpoint_allows_http() {
        let generator = SasUrlGenerator::new(
            SharedKeyCredential::new("devstoreaccount1", KEY).unwrap(),
            "http://127.0.0.1:10000/devstoreaccount1",
        );
        let sts = generator.string_to_sign("documents", "a", "s", "e");
        assert!(sts.contains("\nhttps,http\n"));
        let token = generator.token("documents", "a", noon()).unwrap();
        assert!(token.contains("spr=https%2Chttp"));
    }
}
