//! Studio intro trimming
//!
//! Some providers prepend a fixed studio intro to every episode. Each studio
//! has a known intro length that is cut from the start of the video and then
//! added to every subtitle timestamp.

use std::fmt;

/// A studio whose intro can be trimmed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntroStudio {
    Daisuki,
    Aniplex,
    Sunrise,
}

impl IntroStudio {
    /// All studios, in the order their intros are trimmed
    pub const ALL: [IntroStudio; 3] = [
        IntroStudio::Daisuki,
        IntroStudio::Aniplex,
        IntroStudio::Sunrise,
    ];

    /// Length of the studio's intro in milliseconds
    pub fn intro_ms(self) -> u64 {
        match self {
            IntroStudio::Daisuki => 5040,
            IntroStudio::Aniplex => 6747,
            IntroStudio::Sunrise => 8227,
        }
    }

    /// Token that selects this studio in a trim selector
    pub fn token(self) -> &'static str {
        match self {
            IntroStudio::Daisuki => "daisuki",
            IntroStudio::Aniplex => "aniplex",
            IntroStudio::Sunrise => "sunrise",
        }
    }
}

impl fmt::Display for IntroStudio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntroStudio::Daisuki => "Daisuki",
            IntroStudio::Aniplex => "Aniplex",
            IntroStudio::Sunrise => "Sunrise",
        };
        f.write_str(name)
    }
}

/// The set of studio intros to trim, fixed for a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrimSelection {
    studios: Vec<IntroStudio>,
}

impl TrimSelection {
    /// Trims nothing
    pub fn none() -> Self {
        Self::default()
    }

    /// Parses a trim selector such as `"daisuki,sunrise"`
    ///
    /// Matching is a case-insensitive substring test per studio token, so any
    /// separator works. Unknown tokens are ignored.
    pub fn parse(selector: &str) -> Self {
        let selector = selector.to_lowercase();
        let studios = IntroStudio::ALL
            .into_iter()
            .filter(|studio| selector.contains(studio.token()))
            .collect();

        Self { studios }
    }

    /// Builds a selection from explicit studios
    pub fn from_studios(studios: impl IntoIterator<Item = IntroStudio>) -> Self {
        let mut studios: Vec<IntroStudio> = studios.into_iter().collect();
        studios.sort();
        studios.dedup();
        Self { studios }
    }

    /// Selected studios, in trim order
    pub fn studios(&self) -> &[IntroStudio] {
        &self.studios
    }

    pub fn is_empty(&self) -> bool {
        self.studios.is_empty()
    }

    /// Sum of all selected intro lengths in milliseconds
    pub fn total_offset_ms(&self) -> u64 {
        self.studios.iter().map(|studio| studio.intro_ms()).sum()
    }
}
