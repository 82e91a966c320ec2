//! External identifier validation.
//!
//! Shape and checksum checks for the identifier schemes governance rules
//! care about (ORCID researcher ids, ROR organization ids, e-Rad researcher
//! numbers, plain URLs), plus the remote lookup seam used for reachability
//! and registry queries.

#[cfg(feature = "remote")]
use std::time::Duration;

/// Canonical URL prefix of ORCID researcher ids.
pub const ORCID_URL_PREFIX: &str = "https://orcid.org/";

/// Canonical URL prefix of ROR organization ids.
pub const ROR_URL_PREFIX: &str = "https://ror.org/";

/// Default timeout for remote lookups (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Check if a string is an absolute http(s) URL.
pub fn is_absolute_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// ISO 7064 mod 11-2 check character over a digit string.
///
/// Returns `None` if `digits` contains anything but ASCII digits.
pub fn mod11_2_check_char(digits: &str) -> Option<char> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut total: u32 = 0;
    for b in digits.bytes() {
        total = (total + u32::from(b - b'0')) * 2;
    }
    let result = (12 - total % 11) % 11;
    Some(if result == 10 {
        'X'
    } else {
        char::from(b'0' + result as u8)
    })
}

/// Validate an ORCID id by recomputing its checksum.
///
/// Accepts the bare `0000-0000-0000-0000` form or the full URL form. The
/// final character is a mod 11-2 check character over the preceding 15
/// digits; a merely well-shaped id with a wrong check character fails.
pub fn is_valid_orcid(id: &str) -> bool {
    let bare = id.strip_prefix(ORCID_URL_PREFIX).unwrap_or(id);

    let groups: Vec<&str> = bare.split('-').collect();
    if groups.len() != 4 || groups.iter().any(|g| g.len() != 4) {
        return false;
    }

    let compact: String = groups.concat();
    let (base, check) = compact.split_at(15);
    let check = match check.chars().next() {
        Some(c) => c,
        None => return false,
    };
    mod11_2_check_char(base) == Some(check)
}

/// Shape check for a ROR organization id (URL form).
///
/// ROR ids are nine characters starting with `0`, drawn from the
/// Crockford base32 alphabet (digits and lowercase letters without
/// `i`, `l`, `o`, `u`).
pub fn is_valid_ror(id: &str) -> bool {
    let Some(tail) = id.strip_prefix(ROR_URL_PREFIX) else {
        return false;
    };
    tail.len() == 9
        && tail.starts_with('0')
        && tail
            .chars()
            .all(|c| c.is_ascii_digit() || (c.is_ascii_lowercase() && !"ilou".contains(c)))
}

/// Shape check for an e-Rad researcher number (eight digits).
pub fn is_erad_researcher_number(s: &str) -> bool {
    s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit())
}

/// Seam for rules that consult the network.
///
/// Rules never talk HTTP directly; they go through this trait so tests can
/// inject stubs and builds without the `remote` feature degrade to
/// shape-only checking.
pub trait RemoteLookup {
    /// Whether a GET of `url` succeeds with a non-error status.
    fn is_reachable(&self, url: &str) -> bool;

    /// Canonical registered name for a ROR organization id (URL form),
    /// or `None` if the registry does not know it.
    fn registered_name(&self, ror_id: &str) -> Option<String>;
}

/// [`RemoteLookup`] backed by a blocking HTTP client.
#[cfg(feature = "remote")]
pub struct HttpLookup {
    client: reqwest::blocking::Client,
    ror_api_base: String,
}

#[cfg(feature = "remote")]
impl HttpLookup {
    /// Client against the public ROR API.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_ror_api_base("https://api.ror.org/organizations")
    }

    /// Client against an alternate registry endpoint.
    pub fn with_ror_api_base(base: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            ror_api_base: base.into(),
        })
    }
}

#[cfg(feature = "remote")]
impl RemoteLookup for HttpLookup {
    fn is_reachable(&self, url: &str) -> bool {
        self.client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .is_ok()
    }

    fn registered_name(&self, ror_id: &str) -> Option<String> {
        let tail = ror_id.strip_prefix(ROR_URL_PREFIX)?;
        let url = format!("{}/{}", self.ror_api_base, tail);
        let body: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .ok()?
            .error_for_status()
            .ok()?
            .json()
            .ok()?;
        body.get("name")
            .and_then(|n| n.as_str())
            .map(String::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_char_known_values() {
        // 0000-0002-1825-0097 is the documented ORCID example.
        assert_eq!(mod11_2_check_char("000000021825009"), Some('7'));
        assert_eq!(mod11_2_check_char("000000021694233"), Some('X'));
    }

    #[test]
    fn check_char_rejects_non_digits() {
        assert_eq!(mod11_2_check_char("00000002182500a"), None);
        assert_eq!(mod11_2_check_char(""), None);
    }

    #[test]
    fn orcid_valid_forms() {
        assert!(is_valid_orcid("0000-0002-1825-0097"));
        assert!(is_valid_orcid("https://orcid.org/0000-0002-1825-0097"));
        assert!(is_valid_orcid("0000-0002-1694-233X"));
    }

    #[test]
    fn orcid_rejects_transposed_digits() {
        // Same digits as the valid id with two transposed.
        assert!(!is_valid_orcid("0000-0002-1825-0079"));
    }

    #[test]
    fn orcid_rejects_bad_shape() {
        assert!(!is_valid_orcid("0000-0002-1825"));
        assert!(!is_valid_orcid("0000000218250097"));
        assert!(!is_valid_orcid(""));
    }

    #[test]
    fn ror_shape() {
        assert!(is_valid_ror("https://ror.org/04ksd4g47"));
        assert!(!is_valid_ror("https://ror.org/14ksd4g47")); // must start with 0
        assert!(!is_valid_ror("https://ror.org/04ksd4g4")); // too short
        assert!(!is_valid_ror("https://ror.org/04ksd4g4l")); // excluded letter
        assert!(!is_valid_ror("04ksd4g47")); // bare id, URL form required
    }

    #[test]
    fn erad_number_shape() {
        assert!(is_erad_researcher_number("01234567"));
        assert!(!is_erad_researcher_number("0123456"));
        assert!(!is_erad_researcher_number("0123456a"));
    }

    #[test]
    fn url_shape() {
        assert!(is_absolute_url("https://example.com/data.csv"));
        assert!(is_absolute_url("http://example.com"));
        assert!(!is_absolute_url("./data/file.txt"));
        assert!(!is_absolute_url("ftp://example.com"));
    }
}
