//! Per-map spawn click targets for the spawn-then-suicide routine.
//!
//! Coordinates are legacy relative mouse offsets from the top-left cursor reset position.

use crate::perception::layout::Point;
use crate::session::Team;

macro_rules! maps {
    ($($variant:ident => $slug:literal),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum MapId {
            $($variant),*
        }

        impl MapId {
            pub const ALL: &'static [MapId] = &[$(MapId::$variant),*];

            pub fn slug(self) -> &'static str {
                match self {
                    $(MapId::$variant => $slug),*
                }
            }

            pub fn from_slug(slug: &str) -> Option<Self> {
                match slug {
                    $($slug => Some(MapId::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

maps! {
    DalianPlant => "dalian-plant",
    StrikeAtKarkand => "strike-at-karkand",
    DragonValley => "dragon-valley",
    FushePass => "fushe-pass",
    DaqingOilfields => "daqing-oilfields",
    GulfOfOman => "gulf-of-oman",
    RoadToJalalabad => "road-to-jalalabad",
    WakeIsland2007 => "wake-island-2007",
    ZatarWetlands => "zatar-wetlands",
    SharqiPeninsula => "sharqi-peninsula",
    KubraDam => "kubra-dam",
    OperationCleanSweep => "operation-clean-sweep",
    MashtuurCity => "mashtuur-city",
    MidnightSun => "midnight-sun",
    OperationRoadRage => "operation-road-rage",
    TarabaQuarry => "taraba-quarry",
    GreatWall => "great-wall",
    HighwayTampa => "highway-tampa",
    OperationBluePearl => "operation-blue-pearl",
    SonghuaStalemate => "songhua-stalemate",
    OperationHarvest => "operation-harvest",
    OperationSmokeScreen => "operation-smoke-screen",
}

impl std::fmt::Display for MapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// Spawn menu point to click for our team, and the neutral point that deselects it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnPoints {
    pub spawn: Point,
    pub deselect: Point,
}

const DESELECT: Point = Point::new(250, 50);

const fn pair(a: (i32, i32), b: (i32, i32)) -> [Point; 2] {
    [Point::new(a.0, a.1), Point::new(b.0, b.1)]
}

/// Spawn targets indexed by team for one (map, size) layout.
fn team_points(map: MapId, size: u8) -> Option<[Point; 2]> {
    use MapId::*;
    let points = match (map, size) {
        (DalianPlant, 64) => pair((618, 218), (296, 296)),
        (StrikeAtKarkand, 16) => pair((490, 390), (463, 98)),
        (StrikeAtKarkand, 64) => pair((382, 390), (569, 160)),
        (DragonValley, 64) => pair((517, 56), (476, 363)),
        (FushePass, 64) => pair((562, 132), (253, 312)),
        (DaqingOilfields, 64) => pair((500, 346), (363, 137)),
        (GulfOfOman, 16) => pair((416, 355), (434, 122)),
        (GulfOfOman, 64) => pair((308, 326), (581, 132)),
        (RoadToJalalabad, 16) => pair((382, 315), (487, 133)),
        (RoadToJalalabad, 64) => pair((314, 159), (569, 156)),
        (WakeIsland2007, 64) => pair((359, 158), (524, 290)),
        (ZatarWetlands, 64) => pair((372, 44), (604, 336)),
        (SharqiPeninsula, 16) => pair((495, 209), (360, 284)),
        (SharqiPeninsula, 64) => pair((476, 220), (321, 128)),
        (KubraDam, 64) => pair((494, 137), (336, 330)),
        (OperationCleanSweep, 64) => pair((326, 120), (579, 249)),
        (MashtuurCity, 16) => pair((503, 316), (406, 155)),
        (MashtuurCity, 64) => pair((563, 319), (328, 89)),
        (MidnightSun, 64) => pair((590, 207), (317, 287)),
        (OperationRoadRage, 64) => pair((419, 32), (458, 407)),
        (TarabaQuarry, 32) => pair((569, 346), (310, 379)),
        (GreatWall, 32) => pair((529, 122), (368, 360)),
        (HighwayTampa, 64) => pair((612, 246), (428, 52)),
        (OperationBluePearl, 64) => pair((588, 268), (280, 154)),
        (SonghuaStalemate, 64) => pair((565, 244), (306, 234)),
        (OperationHarvest, 64) => pair((544, 393), (509, 93)),
        (OperationSmokeScreen, 32) => pair((434, 98), (466, 383)),
        _ => return None,
    };
    Some(points)
}

/// `None` means the (map, size) layout is unsupported; callers skip spawning for the round.
pub fn lookup(map: MapId, size: u8, team: Team) -> Option<SpawnPoints> {
    team_points(map, size).map(|points| SpawnPoints {
        spawn: points[team.index()],
        deselect: DESELECT,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_round_trip_for_every_map() {
        for map in MapId::ALL {
            assert_eq!(MapId::from_slug(map.slug()), Some(*map));
        }
        assert_eq!(MapId::from_slug("el-alamein"), None);
    }

    #[test]
    fn lookup_picks_point_by_team() {
        let usmc = lookup(MapId::StrikeAtKarkand, 64, Team::UsmcEu).unwrap();
        let mec = lookup(MapId::StrikeAtKarkand, 64, Team::ChinaMec).unwrap();
        assert_eq!(usmc.spawn, Point::new(382, 390));
        assert_eq!(mec.spawn, Point::new(569, 160));
        assert_eq!(usmc.deselect, mec.deselect);
    }

    #[test]
    fn unsupported_size_is_none() {
        assert_eq!(lookup(MapId::DalianPlant, 16, Team::UsmcEu), None);
        assert_eq!(lookup(MapId::GreatWall, 64, Team::ChinaMec), None);
    }
}
