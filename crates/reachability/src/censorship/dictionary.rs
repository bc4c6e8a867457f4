//! Phrases and hostnames seen on ISP and regulator block pages.
//!
//! Matching is case-insensitive substring matching over decoded text.

/// Body phrases that mark an interference page
pub const INTERFERENCE_PHRASES: &[&str] = &[
    "blocked",
    "filtered",
    "access denied",
    "access restricted",
    "access to this resource is restricted",
    "this site has been blocked",
    "unavailable for legal reasons",
    "451 unavailable",
    "censored",
    "court order",
    "roskomnadzor",
    "rkn.gov.ru",
    "eais.rkn.gov.ru",
    "zapret-info",
    "доступ ограничен",
    "доступ к ресурсу ограничен",
    "заблокирован",
    "по решению суда",
    "peyvandha",
    "internet positif",
    "internetpositif",
    "trustpositif",
    "aduankonten",
    "ministry of communications",
    "telecommunications regulatory",
    "btk.gov.tr",
    "erişim engellendi",
];

/// Hosts that serve block pages when a redirect chain lands on them
pub const BLOCK_PAGE_HOSTS: &[&str] = &[
    "warning.rt.ru",
    "blocklist.rkn.gov.ru",
    "eais.rkn.gov.ru",
    "zapret-info.gov.ru",
    "peyvandha.ir",
    "10.10.34.34",
    "10.10.34.35",
    "internetpositif.uzone.id",
    "mercusuar.uzone.id",
    "lamanlabuh.aduankonten.id",
    "195.175.254.2",
];

/// First interference phrase found in `text`
pub fn find_phrase(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    INTERFERENCE_PHRASES.iter().copied().find(|phrase| lower.contains(phrase))
}

/// Same as [`find_phrase`] over raw bytes, decoded lossily
pub fn find_phrase_in_bytes(bytes: &[u8]) -> Option<&'static str> {
    find_phrase(&String::from_utf8_lossy(bytes))
}

/// Whether a hostname belongs to a known block page or reads like one
pub fn is_block_host(host: &str) -> Option<&'static str> {
    let lower = host.trim_end_matches('.').to_lowercase();
    BLOCK_PAGE_HOSTS
        .iter()
        .copied()
        .find(|known| lower == *known || lower.ends_with(&format!(".{known}")))
        .or_else(|| find_phrase(&lower))
}
