//! Configuration validation rules.

use super::schema::Config;

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &Config) -> crate::Result<()> {
    let mut errors = Vec::new();

    let xmpp = &config.xmpp;
    if xmpp.username.trim().is_empty() {
        errors.push("xmpp.username is required".to_string());
    } else if !xmpp.username.contains('@') {
        errors.push("xmpp.username must be a JID (user@server)".to_string());
    }
    if xmpp.password.is_empty() {
        errors.push("xmpp.password is required".to_string());
    }
    if xmpp.muc.trim().is_empty() {
        errors.push("xmpp.muc is required".to_string());
    } else if !xmpp.muc.contains('@') || xmpp.muc.contains('/') {
        errors.push("xmpp.muc must be a bare room JID (room@service)".to_string());
    }
    if xmpp.muc_nick.trim().is_empty() {
        errors.push("xmpp.muc_nick is required".to_string());
    }
    for admin in &xmpp.admins {
        if !admin.contains('@') || admin.contains('/') {
            errors.push(format!("xmpp.admins entry {:?} must be a bare JID", admin));
        }
    }

    let mastodon = &config.mastodon;
    if mastodon.instance.trim().is_empty() {
        errors.push("mastodon.instance is required".to_string());
    }
    if mastodon.token.trim().is_empty() {
        errors.push("mastodon.token is required".to_string());
    }
    if mastodon.account.trim().is_empty() {
        errors.push("mastodon.account is required".to_string());
    }

    if config.bridge.retry_delay_secs == 0 {
        errors.push("bridge.retry_delay_secs must be > 0".to_string());
    }
    if config.bridge.connect_timeout_secs == 0 {
        errors.push("bridge.connect_timeout_secs must be > 0".to_string());
    }
    if config.bridge.request_timeout_secs == 0 {
        errors.push("bridge.request_timeout_secs must be > 0".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}
