use regex::Regex;
use std::sync::LazyLock;

/// Replacement for every redacted match.
pub const PLACEHOLDER: &str = "[REDACTED]";

// The pattern set errs toward over-redaction: a false positive costs a
// garbled log line, a false negative leaks a credential.

static RE_PROVIDER_KEY: LazyLock<Regex> = LazyLock::new(|| {
    // sk-..., sk-ant-oat-..., sk-proj-... style keys
    Regex::new(r"sk-[A-Za-z0-9_\-]{8,}").expect("failed to compile regex: provider_key")
});

static RE_BEARER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)bearer\s+[A-Za-z0-9._~+/=\-]+").expect("failed to compile regex: bearer")
});

static RE_JWT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"eyJ[A-Za-z0-9_\-]{8,}\.[A-Za-z0-9._\-]+").expect("failed to compile regex: jwt")
});

static RE_COOKIE_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    // session / token / key / secret cookie or query assignments
    Regex::new(r"(?i)[A-Za-z0-9_.\-]*(session|token|key|secret|password|credential)[A-Za-z0-9_.\-]*\s*=\s*[^\s;&,]+")
        .expect("failed to compile regex: cookie_pair")
});

static RE_OPAQUE_RUN: LazyLock<Regex> = LazyLock::new(|| {
    // Long opaque runs are assumed to be secrets unless proven otherwise
    Regex::new(r"[A-Za-z0-9_\-]{32,}").expect("failed to compile regex: opaque_run")
});

/// Redact secret-shaped substrings from text destined for logs or user-
/// visible errors. Pure and deterministic; mandatory on every error path
/// that crosses a component boundary.
pub fn redact(input: &str) -> String {
    let mut out = RE_BEARER.replace_all(input, PLACEHOLDER).into_owned();
    out = RE_PROVIDER_KEY.replace_all(&out, PLACEHOLDER).into_owned();
    out = RE_JWT.replace_all(&out, PLACEHOLDER).into_owned();
    out = RE_COOKIE_PAIR.replace_all(&out, PLACEHOLDER).into_owned();
    out = RE_OPAQUE_RUN.replace_all(&out, PLACEHOLDER).into_owned();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_sk_keys() {
        let input = "HTTP 401: invalid key sk-ant-oat01-abcdef1234";
        let out = redact(input);
        assert!(!out.contains("sk-ant"));
        assert!(out.contains(PLACEHOLDER));
    }

    #[test]
    fn redacts_bearer_headers() {
        let out = redact("request sent with Authorization: Bearer abc.def-ghi");
        assert!(!out.contains("abc.def-ghi"));
        assert!(out.contains(PLACEHOLDER));
    }

    #[test]
    fn redacts_jwts() {
        let out = redact("token eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiIxIn0.sig rejected");
        assert!(!out.contains("eyJhbGci"));
    }

    #[test]
    fn redacts_cookie_pairs() {
        let out = redact("cookie sessionKey=abc123; path=/");
        assert!(!out.contains("abc123"));
    }

    #[test]
    fn redacts_long_opaque_runs() {
        let out = redact("got value d41d8cd98f00b204e9800998ecf8427eaabbccdd in response");
        assert!(!out.contains("d41d8cd9"));
        assert!(out.contains(PLACEHOLDER));
    }

    #[test]
    fn leaves_ordinary_text_alone() {
        let input = "HTTP 503: service temporarily unavailable";
        assert_eq!(redact(input), input);
    }

    #[test]
    fn leaves_short_identifiers_alone() {
        // Hostnames and short ids stay readable
        let input = "connect error: api.anthropic.com timed out";
        assert_eq!(redact(input), input);
    }

    #[test]
    fn is_deterministic() {
        let input = "Bearer zzz and sk-proj-123456789 and more";
        assert_eq!(redact(input), redact(input));
    }
}
