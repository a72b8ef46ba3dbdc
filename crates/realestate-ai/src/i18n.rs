//! English/Arabic message catalog used by permit and listing responses.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    En,
    Ar,
}

impl Lang {
    /// Only the exact code `ar` selects Arabic.
    pub fn resolve(input: Option<&str>) -> Self {
        match input {
            Some("ar") => Lang::Ar,
            _ => Lang::En,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Lang::En => "en",
            Lang::Ar => "ar",
        }
    }
}

fn lookup(lang: Lang, key: &str) -> Option<&'static str> {
    let text = match (lang, key) {
        (Lang::En, "permits.valid") => "Permit verified and active.",
        (Lang::En, "permits.invalid") => "Permit Invalid or Expired",
        (Lang::En, "permits.expired") => "Permit expired.",
        (Lang::En, "listing.success") => "Listing copy generated successfully.",
        (Lang::En, "listing.invalidPermit") => "Permit must be valid before generating copy.",
        (Lang::En, "listing.error") => "Unable to generate listing.",
        (Lang::En, "listing.defaultHeadline") => "New listing",
        (Lang::En, "listing.noFeatures") => "No highlighted features",
        (Lang::En, "listing.summary") => {
            "Permit {{trakheesi}}: {{headline}}. Features: {{features}}."
        }
        (Lang::Ar, "permits.valid") => "تم التحقق من التصريح وهو ساري.",
        (Lang::Ar, "permits.invalid") => "الترخيص غير صالح أو منتهي",
        (Lang::Ar, "permits.expired") => "انتهت صلاحية الترخيص.",
        (Lang::Ar, "listing.success") => "تم إنشاء وصف الإعلان بنجاح.",
        (Lang::Ar, "listing.invalidPermit") => "يجب أن يكون الترخيص صالحاً قبل إنشاء الوصف.",
        (Lang::Ar, "listing.error") => "تعذر إنشاء الإعلان.",
        (Lang::Ar, "listing.defaultHeadline") => "إعلان جديد",
        (Lang::Ar, "listing.noFeatures") => "لا توجد مزايا مميزة",
        (Lang::Ar, "listing.summary") => "تصريح {{trakheesi}}: {{headline}}. المزايا: {{features}}.",
        _ => return None,
    };
    Some(text)
}

/// Resolves `key` for `lang` (falling back to English, then the key itself)
/// and substitutes `{{name}}` placeholders from `vars`.
pub fn translate(lang: Lang, key: &str, vars: &[(&str, &str)]) -> String {
    let template = lookup(lang, key)
        .or_else(|| lookup(Lang::En, key))
        .unwrap_or(key);

    vars.iter()
        .fold(template.to_string(), |text, (name, value)| {
            text.replace(&format!("{{{{{name}}}}}"), value)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_strict_about_arabic() {
        assert_eq!(Lang::resolve(Some("ar")), Lang::Ar);
        assert_eq!(Lang::resolve(Some("AR")), Lang::En);
        assert_eq!(Lang::resolve(Some("fr")), Lang::En);
        assert_eq!(Lang::resolve(None), Lang::En);
    }

    #[test]
    fn interpolates_summary() {
        let text = translate(
            Lang::En,
            "listing.summary",
            &[
                ("trakheesi", "12345678"),
                ("headline", "Marina view"),
                ("features", "Pool, Gym"),
            ],
        );
        assert_eq!(text, "Permit 12345678: Marina view. Features: Pool, Gym.");
    }

    #[test]
    fn arabic_catalog_is_used() {
        assert_eq!(
            translate(Lang::Ar, "permits.expired", &[]),
            "انتهت صلاحية الترخيص."
        );
    }

    #[test]
    fn unknown_key_echoes_key() {
        assert_eq!(translate(Lang::Ar, "missing.key", &[]), "missing.key");
    }
}
