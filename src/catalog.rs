//! Static domain data: the competitive map pool, market catalogue, agent
//! roles and the franchised team list per region.

use serde::Serialize;

/// Current competitive map pool.
pub const MAP_POOL: [&str; 7] = ["Abyss", "Bind", "Breeze", "Corrode", "Haven", "Pearl", "Split"];

/// Market families the user can enable in the settings page.
pub const MARKET_TYPES: [(&str, &str); 12] = [
    ("map_winner", "Map Winner (ML)"),
    ("map_ot", "Overtime per Map"),
    ("map_pistol", "Pistol Rounds"),
    ("map_handicap", "Round Handicap"),
    ("map_total_rounds", "Total Rounds (Over/Under)"),
    ("match_winner", "Match Winner (Series)"),
    ("correct_score", "Series Correct Score"),
    ("over_maps", "Over 3.5 Maps (BO5)"),
    ("over_maps_2_5", "Over 2.5 Maps (BO3)"),
    ("under_maps_2_5", "Under 2.5 Maps (BO3)"),
    ("over_maps_4_5", "Over 4.5 Maps (BO5)"),
    ("under_maps_4_5", "Under 4.5 Maps (BO5)"),
];

/// Markets enabled on a fresh install.
pub const DEFAULT_ENABLED_MARKETS: [&str; 6] = [
    "map_winner",
    "map_ot",
    "map_pistol",
    "match_winner",
    "correct_score",
    "over_maps",
];

#[derive(Debug, Clone, Serialize)]
pub struct MarketInfo {
    pub id: &'static str,
    pub label: &'static str,
}

pub fn markets() -> Vec<MarketInfo> {
    MARKET_TYPES
        .iter()
        .map(|(id, label)| MarketInfo { id, label })
        .collect()
}

/// Collapse a concrete market type onto the family used in the settings.
///
/// `map2_winner` → `map_winner`, `over_2.5_maps` / `under_4.5_maps` →
/// `over_maps`; anything else is returned lower-cased.
pub fn market_family(market_type: &str) -> String {
    let m = market_type.trim().to_lowercase();
    if let Some(rest) = m.strip_prefix("map") {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits > 0 {
            if let Some(suffix) = rest[digits..].strip_prefix('_') {
                return format!("map_{suffix}");
            }
        }
    }
    if (m.starts_with("over_") || m.starts_with("under_")) && m.ends_with("_maps") {
        return "over_maps".to_string();
    }
    m
}

// ---------------------------------------------------------------------------
// Agent roles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Duelist,
    Initiator,
    Controller,
    Sentinel,
}

const AGENT_ROLES: [(&str, Role); 28] = [
    ("jett", Role::Duelist),
    ("raze", Role::Duelist),
    ("reyna", Role::Duelist),
    ("phoenix", Role::Duelist),
    ("yoru", Role::Duelist),
    ("neon", Role::Duelist),
    ("iso", Role::Duelist),
    ("waylay", Role::Duelist),
    ("sova", Role::Initiator),
    ("breach", Role::Initiator),
    ("skye", Role::Initiator),
    ("kayo", Role::Initiator),
    ("kay/o", Role::Initiator),
    ("fade", Role::Initiator),
    ("gekko", Role::Initiator),
    ("tejo", Role::Initiator),
    ("brimstone", Role::Controller),
    ("omen", Role::Controller),
    ("viper", Role::Controller),
    ("astra", Role::Controller),
    ("harbor", Role::Controller),
    ("clove", Role::Controller),
    ("sage", Role::Sentinel),
    ("cypher", Role::Sentinel),
    ("killjoy", Role::Sentinel),
    ("chamber", Role::Sentinel),
    ("deadlock", Role::Sentinel),
    ("vyse", Role::Sentinel),
];

pub fn agent_role(agent: &str) -> Option<Role> {
    let key = agent.trim().to_lowercase();
    AGENT_ROLES
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, role)| *role)
}

// ---------------------------------------------------------------------------
// Teams
// ---------------------------------------------------------------------------

const AMERICAS: &[&str] = &[
    "100 thieves", "cloud9", "evil geniuses", "furia", "kru esports", "leviatan",
    "loud", "mibr", "nrg", "sentinels", "g2 esports", "envy",
];

const CHINA: &[&str] = &[
    "all gamers", "bilibili gaming", "edward gaming", "funplus phoenix", "jd gaming",
    "nova esports", "titan esports club", "trace esports", "tyloo", "wolves esports",
    "dragon ranger gaming", "xlg esports",
];

const EMEA: &[&str] = &[
    "bbl esports", "fnatic", "fut esports", "karmine corp", "natus vincere",
    "team heretics", "team liquid", "team vitality", "giantx", "gentle mates",
    "ulf esports", "pcific esports",
];

const PACIFIC: &[&str] = &[
    "detonation focusme", "drx", "gen.g", "gen.g esports", "global esports", "paper rex",
    "rex regum qeon", "t1", "team secret", "zeta division", "full sense",
    "nongshim redforce", "varrel",
];

const TEAM_TAGS: &[(&str, &str)] = &[
    ("100 thieves", "100T"), ("cloud9", "C9"), ("evil geniuses", "EG"), ("furia", "FURIA"),
    ("kru esports", "KRU"), ("leviatan", "LEV"), ("loud", "LOUD"), ("mibr", "MIBR"),
    ("nrg", "NRG"), ("sentinels", "SEN"), ("g2 esports", "G2"), ("envy", "ENVY"),
    ("all gamers", "AG"), ("bilibili gaming", "BLG"), ("edward gaming", "EDG"),
    ("funplus phoenix", "FPX"), ("jd gaming", "JDG"), ("nova esports", "NOVA"),
    ("titan esports club", "TEC"), ("trace esports", "TRC"), ("tyloo", "TYLOO"),
    ("wolves esports", "WOLVES"), ("dragon ranger gaming", "DRG"), ("xlg esports", "XLG"),
    ("bbl esports", "BBL"), ("fnatic", "FNC"), ("fut esports", "FUT"), ("karmine corp", "KC"),
    ("natus vincere", "NAVI"), ("team heretics", "TH"), ("team liquid", "TL"),
    ("team vitality", "VIT"), ("giantx", "GX"), ("gentle mates", "GM"),
    ("ulf esports", "ULF"), ("pcific esports", "PCF"),
    ("detonation focusme", "DFM"), ("drx", "DRX"), ("gen.g", "GEN"), ("gen.g esports", "GEN"),
    ("global esports", "GE"), ("paper rex", "PRX"), ("rex regum qeon", "RRQ"), ("t1", "T1"),
    ("team secret", "TS"), ("zeta division", "ZETA"), ("full sense", "FS"),
    ("nongshim redforce", "NS"), ("varrel", "VARREL"),
];

/// Lower-cased team names of a region's franchised league, `None` for an
/// unknown region.
pub fn region_team_names(region: &str) -> Option<&'static [&'static str]> {
    match region.trim().to_lowercase().as_str() {
        "americas" => Some(AMERICAS),
        "china" => Some(CHINA),
        "emea" => Some(EMEA),
        "pacific" => Some(PACIFIC),
        _ => None,
    }
}

/// Display tag for a team: the stored tag when present, else the canonical
/// tag for the name, else the trimmed name itself.
pub fn team_display_tag(name: Option<&str>, tag: Option<&str>) -> String {
    if let Some(t) = tag.map(str::trim).filter(|t| !t.is_empty()) {
        return t.to_string();
    }
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => {
            let key = n.to_lowercase();
            TEAM_TAGS
                .iter()
                .find(|(team, _)| *team == key)
                .map(|(_, tag)| tag.to_string())
                .unwrap_or_else(|| n.to_string())
        }
        None => "?".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_display_tag_prefers_stored_tag() {
        assert_eq!(team_display_tag(Some("Sentinels"), Some(" SEN ")), "SEN");
    }

    #[test]
    fn test_team_display_tag_canonical_fallback() {
        assert_eq!(team_display_tag(Some("Paper Rex"), None), "PRX");
        assert_eq!(team_display_tag(Some("Paper Rex"), Some("  ")), "PRX");
        assert_eq!(team_display_tag(Some(" Unknown Squad "), None), "Unknown Squad");
        assert_eq!(team_display_tag(None, None), "?");
    }

    #[test]
    fn test_region_lookup() {
        assert!(region_team_names("emea").unwrap().contains(&"fnatic"));
        assert!(region_team_names("Pacific").unwrap().contains(&"t1"));
        assert!(region_team_names("mars").is_none());
    }

    #[test]
    fn test_market_family() {
        assert_eq!(market_family("map2_winner"), "map_winner");
        assert_eq!(market_family("Map1_OT"), "map_ot");
        assert_eq!(market_family("over_3.5_maps"), "over_maps");
        assert_eq!(market_family("under_2.5_maps"), "over_maps");
        assert_eq!(market_family("match_winner"), "match_winner");
        assert_eq!(market_family("mapping_thing"), "mapping_thing");
    }

    #[test]
    fn test_agent_roles() {
        assert_eq!(agent_role("Jett"), Some(Role::Duelist));
        assert_eq!(agent_role("KAY/O"), Some(Role::Initiator));
        assert_eq!(agent_role("nobody"), None);
    }
}
