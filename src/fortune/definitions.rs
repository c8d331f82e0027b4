//! Label value definitions for the labeler service record.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize)]
pub struct LabelLocale {
    pub lang: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelValueDefinition {
    pub identifier: &'static str,
    pub severity: &'static str,
    pub blurs: &'static str,
    pub default_setting: &'static str,
    pub locales: Vec<LabelLocale>,
}

impl LabelValueDefinition {
    fn inform(identifier: &'static str, locales: Vec<LabelLocale>) -> Self {
        Self {
            identifier,
            severity: "inform",
            blurs: "none",
            default_setting: "warn",
            locales,
        }
    }
}

fn locales(ja: (&'static str, &'static str), en: (&'static str, &'static str)) -> Vec<LabelLocale> {
    vec![
        LabelLocale { lang: "ja", name: ja.0, description: ja.1 },
        LabelLocale { lang: "en", name: en.0, description: en.1 },
    ]
}

/// Definitions for every daily fortune, in table order.
pub fn fortune_definitions() -> Vec<LabelValueDefinition> {
    vec![
        LabelValueDefinition::inform("daikichi", locales(
            ("大吉", "今日の運勢は大吉です！最高の一日になりそう。"),
            ("Daikichi", "Great Blessing! You will have an excellent day."),
        )),
        LabelValueDefinition::inform("kichi", locales(
            ("吉", "今日の運勢は吉です。良いことあるかも。"),
            ("Kichi", "Blessing. Good things might happen."),
        )),
        LabelValueDefinition::inform("chukichi", locales(
            ("中吉", "今日の運勢は中吉です。そこそこ良い感じです。"),
            ("Chukichi", "Middle Blessing. Not bad at all."),
        )),
        LabelValueDefinition::inform("shokichi", locales(
            ("小吉", "今日の運勢は小吉です。ささやかな幸せを大切に。"),
            ("Shokichi", "Small Blessing. Cherish the little things."),
        )),
        LabelValueDefinition::inform("suekichi", locales(
            ("末吉", "今日の運勢は末吉です。これから良くなるはず。"),
            ("Suekichi", "Ending Blessing. Things will get better."),
        )),
        LabelValueDefinition::inform("kyo", locales(
            ("凶", "今日の運勢は凶です。気を引き締めていきましょう。"),
            ("Kyo", "Curse. Stay alert."),
        )),
        LabelValueDefinition::inform("daikyo", locales(
            ("大凶", "今日の運勢は大凶です。無理せず慎重に。"),
            ("Daikyo", "Great Curse. Be very careful today."),
        )),
    ]
}

/// The `app.bsky.labeler.service` record advertising the fortune labels.
pub fn labeler_service_record() -> Value {
    let definitions = fortune_definitions();
    let values: Vec<&str> = definitions.iter().map(|d| d.identifier).collect();
    json!({
        "$type": "app.bsky.labeler.service",
        "createdAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "policies": {
            "labelValues": values,
            "labelValueDefinitions": definitions,
        }
    })
}
