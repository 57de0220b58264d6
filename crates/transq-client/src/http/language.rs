//! Mapping from short language tags to the service's FLORES-200 codes.

/// Translate an ISO 639-1 tag (`en`, `zh`) into the code the backend expects
/// (`eng_Latn`, `zho_Hans`). Unknown tags, including codes that are already
/// in backend form, pass through unchanged.
pub fn backend_language_code(language: &str) -> &str {
    match language {
        "am" => "amh_Ethi",
        "ar" => "arb_Arab",
        "en" => "eng_Latn",
        "es" => "spa_Latn",
        "fr" => "fra_Latn",
        "ha" => "hau_Latn",
        "hi" => "hin_Deva",
        "ht" => "hat_Latn",
        "ig" => "ibo_Latn",
        "km" => "khm_Khmr",
        "ky" => "kir_Cyrl",
        "lo" => "lao_Laoo",
        "mg" => "plt_Latn",
        "mn" => "khk_Cyrl",
        "my" => "mya_Mymr",
        "ne" => "npi_Deva",
        "ps" => "pbt_Arab",
        "pt" => "por_Latn",
        "sd" => "snd_Arab",
        "si" => "sin_Sinh",
        "sw" => "swh_Latn",
        "te" => "tel_Telu",
        "tg" => "tgk_Cyrl",
        "xh" => "xho_Latn",
        "yo" => "yor_Latn",
        "zh" => "zho_Hans",
        "zu" => "zul_Latn",
        other => other,
    }
}
