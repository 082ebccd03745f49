//! The resolution ladder: the fixed, ordered set of output renditions
//! every uploaded source is transcoded into.

use serde::Serialize;

/// One target rendition. Names are unique within the ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rung {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    /// Nominal stream bandwidth in bits/s, advertised in the master
    /// playlist. Not a rate-control target.
    pub bandwidth: u32,
}

impl Rung {
    pub fn scale_filter(&self) -> String {
        format!("scale={}:{}", self.width, self.height)
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

const DEFAULT_RUNGS: &[Rung] = &[
    Rung {
        name: "144p",
        width: 256,
        height: 144,
        bandwidth: 200_000,
    },
    Rung {
        name: "360p",
        width: 640,
        height: 360,
        bandwidth: 800_000,
    },
    Rung {
        name: "720p",
        width: 1280,
        height: 720,
        bandwidth: 2_800_000,
    },
    Rung {
        name: "1080p",
        width: 1920,
        height: 1080,
        bandwidth: 5_000_000,
    },
    Rung {
        name: "4K",
        width: 3840,
        height: 2160,
        bandwidth: 16_000_000,
    },
];

/// Ordered, duplicate-free set of rungs. Changing the ladder changes the
/// shape of future jobs only; completed jobs are never revisited.
#[derive(Debug, Clone)]
pub struct Ladder {
    rungs: Vec<Rung>,
}

impl Default for Ladder {
    fn default() -> Self {
        Self {
            rungs: DEFAULT_RUNGS.to_vec(),
        }
    }
}

impl Ladder {
    /// Build a ladder from explicit rungs. Panics in debug builds if a
    /// name repeats; the ladder is static configuration, not user input.
    pub fn new(rungs: Vec<Rung>) -> Self {
        debug_assert!(
            rungs
                .iter()
                .enumerate()
                .all(|(i, r)| rungs[..i].iter().all(|p| p.name != r.name)),
            "ladder rung names must be unique"
        );
        Self { rungs }
    }

    pub fn rungs(&self) -> &[Rung] {
        &self.rungs
    }

    pub fn len(&self) -> usize {
        self.rungs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rungs.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Rung> {
        self.rungs.iter().find(|rung| rung.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rung> {
        self.rungs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ladder_spans_five_renditions() {
        let ladder = Ladder::default();
        let names: Vec<_> = ladder.iter().map(|r| r.name).collect();
        assert_eq!(names, ["144p", "360p", "720p", "1080p", "4K"]);
        assert_eq!(ladder.get("720p").unwrap().resolution(), "1280x720");
    }

    #[test]
    fn lookup_misses_unknown_names() {
        let ladder = Ladder::default();
        assert!(ladder.get("999p").is_none());
        assert!(ladder.get("").is_none());
    }
}
