use rusqlite::Connection;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::secret::Secret;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Cookie database not found for {0}")]
    BrowserNotFound(String),
    #[error("No usable cookie for domain '{0}'")]
    NoMatchingCookie(String),
    #[error("Cookie decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("Cookie database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO error reading cookie store: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Browser {
    Chrome,
    Chromium,
    Edge,
    Firefox,
}

impl Browser {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Chrome => "Chrome",
            Self::Chromium => "Chromium",
            Self::Edge => "Edge",
            Self::Firefox => "Firefox",
        }
    }

    /// All supported browsers in extraction-preference order.
    pub fn all() -> &'static [Browser] {
        &[Self::Chrome, Self::Chromium, Self::Edge, Self::Firefox]
    }
}

struct CookieRow {
    value_plain: Option<String>,
    value_encrypted: Option<Vec<u8>>,
    /// Unix seconds; None for session cookies
    expires: Option<i64>,
}

/// Reads session cookies out of a local browser's cookie store.
///
/// Chromium-family values may be encrypted at rest; decryption needs key
/// material the OS holds (DPAPI on Windows). Firefox stores values in
/// plaintext. Only providers whose auth methods include `Cookie` ever
/// reach this path.
pub struct CookieExtractor;

impl CookieExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Candidate cookie database paths for a browser on this platform.
    fn cookie_db_candidates(browser: Browser) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        match browser {
            Browser::Chrome | Browser::Chromium | Browser::Edge => {
                let vendor_dirs: &[&str] = match browser {
                    #[cfg(target_os = "linux")]
                    Browser::Chrome => &["google-chrome"],
                    #[cfg(not(target_os = "linux"))]
                    Browser::Chrome => &["Google/Chrome"],
                    Browser::Chromium => &["Chromium", "chromium"],
                    #[cfg(target_os = "linux")]
                    Browser::Edge => &["microsoft-edge"],
                    #[cfg(not(target_os = "linux"))]
                    Browser::Edge => &["Microsoft/Edge"],
                    Browser::Firefox => unreachable!(),
                };

                let base = if cfg!(target_os = "windows") {
                    std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
                } else {
                    // macOS: ~/Library/Application Support, Linux: ~/.config
                    dirs::config_dir()
                };

                if let Some(base) = base {
                    for vendor in vendor_dirs {
                        let profile = base.join(vendor).join("User Data").join("Default");
                        let profile = if profile.exists() {
                            profile
                        } else {
                            base.join(vendor).join("Default")
                        };
                        // Newer Chromium keeps the DB under Network/
                        candidates.push(profile.join("Network").join("Cookies"));
                        candidates.push(profile.join("Cookies"));
                    }
                }
            }
            Browser::Firefox => {
                let profiles_dir = if cfg!(target_os = "linux") {
                    dirs::home_dir().map(|h| h.join(".mozilla").join("firefox"))
                } else {
                    dirs::config_dir().map(|c| c.join("Mozilla").join("Firefox").join("Profiles"))
                };

                if let Some(profiles_dir) = profiles_dir {
                    if let Ok(entries) = std::fs::read_dir(&profiles_dir) {
                        for entry in entries.flatten() {
                            let name = entry.file_name();
                            let name = name.to_string_lossy();
                            if name.ends_with(".default") || name.ends_with(".default-release") {
                                candidates.push(entry.path().join("cookies.sqlite"));
                            }
                        }
                    }
                }
            }
        }

        candidates
    }

    fn cookie_db_path(browser: Browser) -> Result<PathBuf, ExtractError> {
        Self::cookie_db_candidates(browser)
            .into_iter()
            .find(|p| p.exists())
            .ok_or_else(|| ExtractError::BrowserNotFound(browser.name().to_string()))
    }

    pub fn is_browser_available(browser: Browser) -> bool {
        Self::cookie_db_path(browser).is_ok()
    }

    /// Extract the first non-expired cookie named `cookie_name` for `domain`,
    /// wrapped as a [`Secret`].
    pub fn extract(
        &self,
        browser: Browser,
        domain: &str,
        cookie_name: &str,
    ) -> Result<Secret, ExtractError> {
        let db_path = Self::cookie_db_path(browser)?;

        // The browser keeps the database locked while running; work on a copy
        let temp_copy = self.copy_if_locked(&db_path)?;
        let read_path = temp_copy.as_deref().unwrap_or(&db_path);

        let rows = match browser {
            Browser::Chrome | Browser::Chromium | Browser::Edge => {
                self.chromium_rows(read_path, domain, cookie_name)?
            }
            Browser::Firefox => self.firefox_rows(read_path, domain, cookie_name)?,
        };

        if let Some(temp) = temp_copy {
            let _ = std::fs::remove_file(temp);
        }

        let now = chrono::Utc::now().timestamp();
        let mut decrypt_failure: Option<ExtractError> = None;

        for row in rows {
            // Expired cookies are never valid credentials
            if matches!(row.expires, Some(exp) if exp <= now) {
                continue;
            }
            if let Some(value) = row.value_plain {
                if !value.is_empty() {
                    return Ok(Secret::new(value));
                }
            }
            if let Some(encrypted) = row.value_encrypted {
                match decrypt_chromium_value(&encrypted) {
                    Ok(value) if !value.is_empty() => return Ok(Secret::new(value)),
                    Ok(_) => {}
                    Err(e) => decrypt_failure = Some(e),
                }
            }
        }

        // A cookie existed but could not be read — report that over "none"
        if let Some(e) = decrypt_failure {
            return Err(e);
        }
        Err(ExtractError::NoMatchingCookie(domain.to_string()))
    }

    /// Try browsers in preference order until one yields a cookie.
    pub fn extract_any(&self, domain: &str, cookie_name: &str) -> Result<Secret, ExtractError> {
        let mut last_err = ExtractError::NoMatchingCookie(domain.to_string());
        for browser in Browser::all() {
            match self.extract(*browser, domain, cookie_name) {
                Ok(secret) => return Ok(secret),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    fn copy_if_locked(&self, path: &Path) -> Result<Option<PathBuf>, ExtractError> {
        if Connection::open(path).is_ok() {
            return Ok(None);
        }
        let temp_path =
            std::env::temp_dir().join(format!("aiquota_cookies_{}.db", std::process::id()));
        std::fs::copy(path, &temp_path)?;
        Ok(Some(temp_path))
    }

    fn chromium_rows(
        &self,
        db_path: &Path,
        domain: &str,
        cookie_name: &str,
    ) -> Result<Vec<CookieRow>, ExtractError> {
        let conn = Connection::open(db_path)?;
        let mut stmt = conn.prepare(
            "SELECT value, encrypted_value, expires_utc
             FROM cookies
             WHERE name = ?1 AND (host_key LIKE ?2 OR host_key = ?3)",
        )?;

        let like = format!("%.{}", domain);
        let rows = stmt.query_map(rusqlite::params![cookie_name, like, domain], |row| {
            let value: String = row.get(0)?;
            let encrypted: Vec<u8> = row.get(1)?;
            let expires_utc: Option<i64> = row.get(2)?;
            Ok(CookieRow {
                value_plain: if value.is_empty() { None } else { Some(value) },
                value_encrypted: if encrypted.is_empty() {
                    None
                } else {
                    Some(encrypted)
                },
                expires: expires_utc.and_then(chromium_expiry_to_unix),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn firefox_rows(
        &self,
        db_path: &Path,
        domain: &str,
        cookie_name: &str,
    ) -> Result<Vec<CookieRow>, ExtractError> {
        let conn = Connection::open(db_path)?;
        let mut stmt = conn.prepare(
            "SELECT value, expiry
             FROM moz_cookies
             WHERE name = ?1 AND (host LIKE ?2 OR host = ?3)",
        )?;

        let like = format!("%.{}", domain);
        let rows = stmt.query_map(rusqlite::params![cookie_name, like, domain], |row| {
            let value: String = row.get(0)?;
            let expiry: Option<i64> = row.get(1)?;
            Ok(CookieRow {
                value_plain: if value.is_empty() { None } else { Some(value) },
                value_encrypted: None,
                expires: expiry.filter(|e| *e > 0),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

impl Default for CookieExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Chromium stores expiry as microseconds since 1601-01-01; 0 marks a
/// session cookie.
fn chromium_expiry_to_unix(expires_utc: i64) -> Option<i64> {
    const WINDOWS_TO_UNIX_EPOCH_SECS: i64 = 11_644_473_600;
    if expires_utc <= 0 {
        return None;
    }
    Some(expires_utc / 1_000_000 - WINDOWS_TO_UNIX_EPOCH_SECS)
}

/// Decrypt a Chromium `encrypted_value`. `v10`/`v11` values are AES-256-GCM
/// under a key wrapped by DPAPI in the browser's `Local State`; anything
/// older is raw DPAPI. Both need Windows key material.
#[cfg(windows)]
fn decrypt_chromium_value(encrypted: &[u8]) -> Result<String, ExtractError> {
    if encrypted.len() > 3 && (&encrypted[..3] == b"v10" || &encrypted[..3] == b"v11") {
        return decrypt_chromium_aead(encrypted);
    }
    let plain = dpapi::unprotect(encrypted)?;
    String::from_utf8(plain).map_err(|e| ExtractError::DecryptionFailed(e.to_string()))
}

#[cfg(windows)]
fn decrypt_chromium_aead(encrypted: &[u8]) -> Result<String, ExtractError> {
    use aes_gcm::aead::{Aead, KeyInit};
    use aes_gcm::{Aes256Gcm, Nonce};

    // "v10" (3) + nonce (12) + ciphertext + tag (16)
    if encrypted.len() < 3 + 12 + 16 {
        return Err(ExtractError::DecryptionFailed(
            "encrypted value too short".into(),
        ));
    }

    let key = chromium_master_key()?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| ExtractError::DecryptionFailed(format!("invalid key: {}", e)))?;
    let nonce = Nonce::from_slice(&encrypted[3..15]);
    let plain = cipher
        .decrypt(nonce, &encrypted[15..])
        .map_err(|_| ExtractError::DecryptionFailed("AES-GCM decryption failed".into()))?;

    String::from_utf8(plain).map_err(|e| ExtractError::DecryptionFailed(e.to_string()))
}

/// Read and DPAPI-unwrap `os_crypt.encrypted_key` from the first browser
/// `Local State` file found.
#[cfg(windows)]
fn chromium_master_key() -> Result<Vec<u8>, ExtractError> {
    use base64::Engine;

    let local_app_data = std::env::var("LOCALAPPDATA")
        .map_err(|_| ExtractError::DecryptionFailed("LOCALAPPDATA not set".into()))?;

    let local_state_paths = [
        PathBuf::from(&local_app_data).join("Google/Chrome/User Data/Local State"),
        PathBuf::from(&local_app_data).join("Chromium/User Data/Local State"),
        PathBuf::from(&local_app_data).join("Microsoft/Edge/User Data/Local State"),
    ];

    for path in &local_state_paths {
        if !path.exists() {
            continue;
        }
        let content = std::fs::read_to_string(path)?;
        let json: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| ExtractError::DecryptionFailed(format!("Local State: {}", e)))?;

        if let Some(encrypted_key_b64) = json
            .pointer("/os_crypt/encrypted_key")
            .and_then(|v| v.as_str())
        {
            let wrapped = base64::engine::general_purpose::STANDARD
                .decode(encrypted_key_b64)
                .map_err(|e| ExtractError::DecryptionFailed(format!("base64: {}", e)))?;
            if wrapped.len() < 5 || &wrapped[..5] != b"DPAPI" {
                return Err(ExtractError::DecryptionFailed("unexpected key format".into()));
            }
            return dpapi::unprotect(&wrapped[5..]);
        }
    }

    Err(ExtractError::DecryptionFailed(
        "no browser encryption key found".into(),
    ))
}

#[cfg(not(windows))]
fn decrypt_chromium_value(_encrypted: &[u8]) -> Result<String, ExtractError> {
    Err(ExtractError::DecryptionFailed(
        "encrypted cookie values require Windows key material".into(),
    ))
}

#[cfg(windows)]
mod dpapi {
    use super::ExtractError;
    use windows::Win32::Security::Cryptography::{
        CryptUnprotectData, CRYPTPROTECT_UI_FORBIDDEN, CRYPT_INTEGER_BLOB,
    };

    #[link(name = "kernel32")]
    extern "system" {
        fn LocalFree(h_mem: *mut std::ffi::c_void) -> *mut std::ffi::c_void;
    }

    /// DPAPI-decrypt a blob tied to the current user account.
    pub fn unprotect(data: &[u8]) -> Result<Vec<u8>, ExtractError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        unsafe {
            let blob_in = CRYPT_INTEGER_BLOB {
                cbData: data.len() as u32,
                pbData: data.as_ptr() as *mut u8,
            };
            let mut blob_out = CRYPT_INTEGER_BLOB::default();

            CryptUnprotectData(
                &blob_in,
                None,
                None,
                None,
                None,
                CRYPTPROTECT_UI_FORBIDDEN,
                &mut blob_out,
            )
            .map_err(|e| ExtractError::DecryptionFailed(format!("DPAPI: {}", e)))?;

            let out = std::slice::from_raw_parts(blob_out.pbData, blob_out.cbData as usize).to_vec();
            LocalFree(blob_out.pbData as *mut std::ffi::c_void);
            Ok(out)
        }
    }
}
