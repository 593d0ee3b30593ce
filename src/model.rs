//! Shows, seasons and episodes.
//!
//! A show owns its seasons and a season owns its episodes. Providers build
//! this tree while listing a show; the pipeline then fills in the per-episode
//! download state.

use serde::{Deserialize, Serialize};

/// Display names of the seasons that have one, indexed by season number
const SEASON_NAMES: [&str; 11] = [
    "Specials",
    "Season One",
    "Season Two",
    "Season Three",
    "Season Four",
    "Season Five",
    "Season Six",
    "Season Seven",
    "Season Eight",
    "Season Nine",
    "Season Ten",
];

/// Returns the directory name for a season
///
/// Season 0 holds specials. Seasons beyond ten fall back to `Season N`.
pub fn season_display_name(number: u32) -> String {
    SEASON_NAMES
        .get(number as usize)
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("Season {}", number))
}

/// Transient state collected while an episode moves through the pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadState {
    /// Quality the stream was resolved at
    pub quality: String,
    /// Location of the stream manifest or media file
    pub stream_url: String,
}

/// Represents a single episode of a show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// The season number this episode belongs to
    pub season_number: u32,
    /// The episode number within the season
    pub episode_number: u32,
    /// The episode title
    pub title: String,
    /// The provider's identifier for this episode
    pub media_id: String,
    /// The episode's page on the provider site
    pub url: String,
    /// File name of the final artifact, without extension
    pub file_name: String,
    /// Filled in by `fetch_episode_info`
    pub download: Option<DownloadState>,
}

impl Episode {
    /// Creates an episode as discovered in a show listing
    pub fn new(
        season_number: u32,
        episode_number: u32,
        title: impl Into<String>,
        media_id: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            season_number,
            episode_number,
            title: title.into(),
            media_id: media_id.into(),
            url: url.into(),
            file_name: String::new(),
            download: None,
        }
    }
}

/// Represents a season of a show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    /// The season number (0 for specials)
    pub number: u32,
    /// Episodes in discovery order
    pub episodes: Vec<Episode>,
}

impl Season {
    /// The directory name of this season
    pub fn display_name(&self) -> String {
        season_display_name(self.number)
    }
}

/// Represents a complete show with all seasons and episodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Show {
    /// The title of the show
    pub title: String,
    /// Seasons ordered by number
    pub seasons: Vec<Season>,
}

impl Show {
    /// Builds a show from a flat list of episodes
    ///
    /// Episodes are grouped by season number. Seasons are ordered by number,
    /// episodes keep the order they were given in.
    pub fn from_episodes(title: impl Into<String>, episodes: Vec<Episode>) -> Self {
        let mut seasons: Vec<Season> = Vec::new();

        for episode in episodes {
            match seasons
                .iter_mut()
                .find(|season| season.number == episode.season_number)
            {
                Some(season) => season.episodes.push(episode),
                None => seasons.push(Season {
                    number: episode.season_number,
                    episodes: vec![episode],
                }),
            }
        }

        seasons.sort_by_key(|season| season.number);

        Self {
            title: title.into(),
            seasons,
        }
    }

    /// Total number of episodes across all seasons
    pub fn episode_count(&self) -> usize {
        self.seasons.iter().map(|season| season.episodes.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_season_display_names() {
        let expected = [
            "Specials",
            "Season One",
            "Season Two",
            "Season Three",
            "Season Four",
            "Season Five",
            "Season Six",
            "Season Seven",
            "Season Eight",
            "Season Nine",
            "Season Ten",
        ];
        for (number, name) in expected.iter().enumerate() {
            assert_eq!(season_display_name(number as u32), *name);
        }
    }

    #[test]
    fn test_season_display_name_fallback() {
        assert_eq!(season_display_name(11), "Season 11");
        assert_eq!(season_display_name(24), "Season 24");
    }

    #[test]
    fn test_show_from_episodes_groups_by_season() {
        let episodes = vec![
            Episode::new(2, 1, "b1", "21", ""),
            Episode::new(1, 2, "a2", "12", ""),
            Episode::new(0, 1, "sp", "01", ""),
            Episode::new(1, 1, "a1", "11", ""),
        ];

        let show = Show::from_episodes("Show", episodes);

        let numbers: Vec<u32> = show.seasons.iter().map(|s| s.number).collect();
        assert_eq!(numbers, [0, 1, 2]);
        let titles: Vec<&str> = show.seasons[1]
            .episodes
            .iter()
            .map(|e| e.title.as_str())
            .collect();
        assert_eq!(titles, ["a2", "a1"]);
        assert_eq!(show.episode_count(), 4);
        assert_eq!(show.seasons[0].display_name(), "Specials");
    }
}
