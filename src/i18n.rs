use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use strum::{AsRefStr, Display as StrumDisplay, EnumIter, EnumString};
use yuuka::derive_struct;

// Include translation TOML at compile time
const RU_RU_TOML: &str = include_str!("../res/i18n/ru_ru.toml");
const EN_US_TOML: &str = include_str!("../res/i18n/en_us.toml");

derive_struct! {
    #[derive(PartialEq, Serialize, Deserialize)]
    pub Lang {
        title: String = "title".to_string(),
        ports_title: String = "ports_title".to_string(),
        no_devices: String = "no_devices".to_string(),
        log_title: String = "log_title".to_string(),
        log_title_follow: String = "log_title_follow".to_string(),
        input_title: String = "input_title".to_string(),
        baud_label: String = "baud_label".to_string(),
        baud_unit: String = "baud_unit".to_string(),
        status_title: String = "status_title".to_string(),
        status_connected: String = "status_connected".to_string(),
        status_disconnected: String = "status_disconnected".to_string(),
        help_short: String = "help_short".to_string(),
        help_input: String = "help_input".to_string(),
        // port labels
        port_label_usb: String = "port_label_usb".to_string(),
        port_label_path: String = "port_label_path".to_string(),
        // session log messages
        unsupported: String = "unsupported".to_string(),
        device_connected: String = "device_connected".to_string(),
        device_disconnected: String = "device_disconnected".to_string(),
        list_failed: String = "list_failed".to_string(),
        port_selected: String = "port_selected".to_string(),
        select_failed: String = "select_failed".to_string(),
        connected_at: String = "connected_at".to_string(),
        connect_failed: String = "connect_failed".to_string(),
        read_failed: String = "read_failed".to_string(),
        stream_closed: String = "stream_closed".to_string(),
        send_failed: String = "send_failed".to_string(),
        disconnected: String = "disconnected".to_string(),
        disconnect_failed: String = "disconnect_failed".to_string(),
    }
}

/// Locales shipped with the binary.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    StrumDisplay,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Locale {
    RuRu,
    EnUs,
}

impl Locale {
    /// Parse the embedded translation table for this locale.
    pub fn lang(self) -> Lang {
        match self {
            Locale::RuRu => parse_toml_to_lang(RU_RU_TOML),
            Locale::EnUs => parse_toml_to_lang(EN_US_TOML),
        }
    }

    /// Pick a locale from the usual environment variables, falling back to Russian.
    pub fn detect() -> Self {
        let mut prefs: Vec<String> = Vec::new();
        if let Ok(v) = std::env::var("LANGUAGE") {
            prefs.extend(v.split(':').map(|s| s.to_lowercase()));
        }
        if let Ok(v) = std::env::var("LC_ALL") {
            prefs.push(v.to_lowercase());
        }
        if let Ok(v) = std::env::var("LANG") {
            prefs.push(v.to_lowercase());
        }
        // Windows common env
        if let Ok(v) = std::env::var("USERLANGUAGE") {
            prefs.push(v.to_lowercase());
        }
        Self::from_prefs(&prefs)
    }

    fn from_prefs(prefs: &[String]) -> Self {
        for p in prefs {
            if p.starts_with("ru") {
                return Locale::RuRu;
            }
            if p.starts_with("en") {
                return Locale::EnUs;
            }
        }
        Locale::RuRu
    }
}

static LANG_SELECTED: OnceCell<Lang> = OnceCell::new();
static LOCALE: OnceCell<Locale> = OnceCell::new();

fn parse_toml_to_lang(content: &str) -> Lang {
    match toml::from_str::<Lang>(content) {
        Ok(l) => l,
        Err(e) => {
            log::warn!(
                "i18n: failed to parse toml: {}\ncontent preview: {}",
                e,
                &content.chars().take(200).collect::<String>()
            );
            // Fallback: return the default Lang (keys as values)
            Lang::default()
        }
    }
}

/// Return a reference to the currently selected `Lang`.
/// Callers can access fields directly, e.g. `i18n::lang().title`.
pub fn lang() -> &'static Lang {
    LANG_SELECTED.get_or_init(|| locale().lang())
}

/// The locale chosen by `init_i18n`, or the detected one if it never ran.
pub fn locale() -> Locale {
    *LOCALE.get_or_init(Locale::detect)
}

pub fn init_i18n(preferred: Option<Locale>) -> Locale {
    let chosen = preferred.unwrap_or_else(Locale::detect);
    LOCALE.set(chosen).ok();
    LANG_SELECTED.set(chosen.lang()).ok();

    let user = whoami::username();
    log::info!("i18n: user={} locale={}", user, locale());
    locale()
}

/// Substitute `{name}` placeholders in a translated template.
pub fn fill(template: &str, args: &[(&str, &dyn Display)]) -> String {
    let mut out = template.to_string();
    for (name, value) in args {
        out = out.replace(&format!("{{{name}}}"), &value.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn every_locale_parses_without_falling_back() {
        for locale in Locale::iter() {
            let lang = locale.lang();
            assert!(lang != Lang::default(), "{locale} fell back to keys");
        }
    }

    #[test]
    fn russian_empty_state_message() {
        assert_eq!(Locale::RuRu.lang().no_devices, "Устройства не найдены");
    }

    #[test]
    fn locale_names_round_trip_through_strum() {
        assert_eq!(Locale::from_str("en_us").ok(), Some(Locale::EnUs));
        assert_eq!(Locale::RuRu.as_ref(), "ru_ru");
    }

    #[test]
    fn prefs_pick_first_known_language() {
        let prefs = vec!["c.utf-8".to_string(), "en_gb.utf-8".to_string()];
        assert_eq!(Locale::from_prefs(&prefs), Locale::EnUs);
        assert_eq!(Locale::from_prefs(&[]), Locale::RuRu);
    }

    #[test]
    fn fill_replaces_named_placeholders() {
        let text = fill("Порт: {path} ({path})", &[("path", &"/dev/ttyUSB0")]);
        assert_eq!(text, "Порт: /dev/ttyUSB0 (/dev/ttyUSB0)");
    }
}
