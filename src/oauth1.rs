/// OAuth 1.0a request signing (HMAC-SHA1)
///
/// Implements the signature scheme from
/// https://docs.x.com/resources/fundamentals/authentication/oauth-1-0a/creating-a-signature:
/// percent-encode and sort the parameters, build the signature base string,
/// and sign it with the consumer secret and token secret.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::Rng;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 unreserved characters stay literal; everything else is encoded
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE_SET).to_string()
}

/// Percent-encode every pair, sort by encoded key, and join with & and =
pub fn parameter_string(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();

    encoded.sort();

    encoded
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// METHOD&encoded-url&encoded-parameter-string
pub fn signature_base_string(method: &str, url: &str, params: &[(String, String)]) -> String {
    format!(
        "{}&{}&{}",
        method,
        percent_encode(url),
        percent_encode(&parameter_string(params))
    )
}

/// Sign a request's parameters, returning the base64 signature
pub fn sign(
    method: &str,
    url: &str,
    params: &[(String, String)],
    consumer_secret: &str,
    token_secret: Option<&str>,
) -> Result<String> {
    let base_string = signature_base_string(method, url, params);
    let signing_key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret.unwrap_or(""))
    );

    let mut mac = HmacSha1::new_from_slice(signing_key.as_bytes())
        .context("Failed to initialize HMAC-SHA1")?;
    mac.update(base_string.as_bytes());

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Build a complete signed Authorization header for a request
///
/// `token` is the user's (oauth_token, oauth_token_secret) pair when signing
/// on a user's behalf; `extra` carries additional oauth parameters such as
/// oauth_callback for the request-token call.
pub fn authorization_header(
    method: &str,
    url: &str,
    consumer_key: &str,
    consumer_secret: &str,
    token: Option<(&str, &str)>,
    extra: &[(&str, &str)],
) -> Result<String> {
    let mut params: Vec<(String, String)> = vec![
        ("oauth_consumer_key".to_string(), consumer_key.to_string()),
        ("oauth_nonce".to_string(), nonce()),
        ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
        ("oauth_timestamp".to_string(), Utc::now().timestamp().to_string()),
        ("oauth_version".to_string(), "1.0".to_string()),
    ];

    if let Some((oauth_token, _)) = token {
        params.push(("oauth_token".to_string(), oauth_token.to_string()));
    }
    for (k, v) in extra {
        params.push((k.to_string(), v.to_string()));
    }

    let signature = sign(
        method,
        url,
        &params,
        consumer_secret,
        token.map(|(_, secret)| secret),
    )?;
    params.push(("oauth_signature".to_string(), signature));

    let header_params = params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!("OAuth {}", header_params))
}

/// Random alphanumeric nonce
fn nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes[..]);
    STANDARD
        .encode(bytes)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // The worked example from the X "creating a signature" documentation
    fn example_params() -> Vec<(String, String)> {
        vec![
            (
                "status".to_string(),
                "Hello Ladies + Gentlemen, a signed OAuth request!".to_string(),
            ),
            ("include_entities".to_string(), "true".to_string()),
            (
                "oauth_consumer_key".to_string(),
                "xvz1evFS4wEEPTGEFPHBog".to_string(),
            ),
            (
                "oauth_nonce".to_string(),
                "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg".to_string(),
            ),
            ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
            ("oauth_timestamp".to_string(), "1318622958".to_string()),
            (
                "oauth_token".to_string(),
                "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb".to_string(),
            ),
            ("oauth_version".to_string(), "1.0".to_string()),
        ]
    }

    #[test]
    fn test_percent_encoding_is_rfc3986() {
        assert_eq!(percent_encode("abc-._~XYZ019"), "abc-._~XYZ019");
        assert_eq!(
            percent_encode("Hello Ladies + Gentlemen!"),
            "Hello%20Ladies%20%2B%20Gentlemen%21"
        );
        assert_eq!(percent_encode("a/b?c=d&e"), "a%2Fb%3Fc%3Dd%26e");
    }

    #[test]
    fn test_parameter_string_sorts_encoded_pairs() {
        let params = example_params();
        assert_eq!(
            parameter_string(&params),
            "include_entities=true&oauth_consumer_key=xvz1evFS4wEEPTGEFPHBog\
             &oauth_nonce=kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg\
             &oauth_signature_method=HMAC-SHA1&oauth_timestamp=1318622958\
             &oauth_token=370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb\
             &oauth_version=1.0\
             &status=Hello%20Ladies%20%2B%20Gentlemen%2C%20a%20signed%20OAuth%20request%21"
        );
    }

    #[test]
    fn test_signature_base_string_shape() {
        let base = signature_base_string(
            "POST",
            "https://api.twitter.com/1.1/statuses/update.json",
            &example_params(),
        );
        assert!(base.starts_with(
            "POST&https%3A%2F%2Fapi.twitter.com%2F1.1%2Fstatuses%2Fupdate.json&include_entities%3Dtrue"
        ));
    }

    #[test]
    fn test_signature_matches_documented_example() {
        let signature = sign(
            "POST",
            "https://api.twitter.com/1.1/statuses/update.json",
            &example_params(),
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
            Some("LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE"),
        )
        .unwrap();

        assert_eq!(signature, "tnnArxj06cWHq44gCs1OSKk/jLY=");
    }

    #[test]
    fn test_authorization_header_contains_signature() {
        let header = authorization_header(
            "POST",
            "https://api.x.com/oauth/request_token",
            "consumer-key",
            "consumer-secret",
            None,
            &[("oauth_callback", "bluebot://callback")],
        )
        .unwrap();

        assert!(header.starts_with("OAuth "));
        assert!(header.contains("oauth_consumer_key=\"consumer-key\""));
        assert!(header.contains("oauth_callback=\"bluebot%3A%2F%2Fcallback\""));
        assert!(header.contains("oauth_signature=\""));
        assert!(!header.contains("oauth_token=\""));
    }

    #[test]
    fn test_nonce_is_alphanumeric() {
        let n = nonce();
        assert!(!n.is_empty());
        assert!(n.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
