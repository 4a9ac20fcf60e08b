/// A user-facing dialog request. Only i18n keys cross this boundary; raw
/// errors are logged, never shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    #[allow(missing_docs)]
    pub title_key: &'static str,
    #[allow(missing_docs)]
    pub content_key: &'static str,
    #[allow(missing_docs)]
    pub severity: DialogSeverity,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogSeverity {
    Danger,
}

impl Dialog {
    /// The established encryption is no longer valid; pairing must be
    /// redone.
    pub fn invalid_encryption() -> Self {
        Dialog {
            title_key: "nativeMessagingInvalidEncryptionTitle",
            content_key: "nativeMessagingInvalidEncryptionDesc",
            severity: DialogSeverity::Danger,
        }
    }

    /// The peer unlocked a vault belonging to a different account.
    pub fn wrong_user() -> Self {
        Dialog {
            title_key: "nativeMessagingWrongUserTitle",
            content_key: "nativeMessagingWrongUserDesc",
            severity: DialogSeverity::Danger,
        }
    }

    #[allow(missing_docs)]
    pub fn biometrics_not_enabled() -> Self {
        Dialog {
            title_key: "biometricsNotEnabledTitle",
            content_key: "biometricsNotEnabledDesc",
            severity: DialogSeverity::Danger,
        }
    }

    #[allow(missing_docs)]
    pub fn biometrics_not_supported() -> Self {
        Dialog {
            title_key: "biometricsNotSupportedTitle",
            content_key: "biometricsNotSupportedDesc",
            severity: DialogSeverity::Danger,
        }
    }
}
