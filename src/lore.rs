//! Canon lore library and discovery tracking
//!
//! The lore corpus itself is compiled in; what's persisted is which books
//! each player has found. Discovered books are also exported as markdown so
//! external knowledge tooling can index them.

use std::collections::HashMap;
use std::path::PathBuf;

use rand::seq::IteratorRandom;
use serde::{Deserialize, Serialize};

use crate::store;

pub struct LoreBook {
    pub id: &'static str,
    pub title: &'static str,
    pub author: &'static str,
    pub pages: &'static [&'static str],
}

pub struct LoreCategory {
    pub id: &'static str,
    pub name: &'static str,
    pub books: &'static [LoreBook],
}

const LIBRARY: &[LoreCategory] = &[
    LoreCategory {
        id: "ancient_builders",
        name: "Ancient History",
        books: &[
            LoreBook {
                id: "builders_origin",
                title: "The First Builders",
                author: "Unknown Scholar",
                pages: &[
                    "In the time before time, when the world was still soft and malleable, the First Builders emerged from the void between stars.",
                    "They did not build with hands as we do, but with intention. Every block they placed carried meaning, every structure told a story that would outlast the ages.",
                    "The ruins we find scattered across the land are but shadows of what once was. The true monuments stand in dimensions we cannot yet perceive.",
                    "Remember: to build is to speak in the language of eternity. The ancients knew this. Do you?",
                ],
            },
            LoreBook {
                id: "builders_fall",
                title: "The Fall of the Builders",
                author: "Eldrin the Wanderer",
                pages: &[
                    "They grew too bold. They built too high. They pierced the veil between worlds and something... looked back.",
                    "The darkness that came was not evil - it was merely hungry. It consumed their greatest works and scattered their knowledge to the corners of existence.",
                    "Some say the End is where they made their final stand. Others say they became something else entirely. The truth, as always, lies somewhere between the blocks.",
                    "We who build in their footsteps must remember: ambition without wisdom invites the void.",
                ],
            },
        ],
    },
    LoreCategory {
        id: "dimensional_secrets",
        name: "Dimensional Theory",
        books: &[
            LoreBook {
                id: "nether_truth",
                title: "The Nether Revelation",
                author: "Lyra Starweaver",
                pages: &[
                    "The Nether is not hell. It is a mirror.",
                    "Every block of netherrack holds the memory of what once grew there. The soul sand remembers those who walked above it. The lava flows with the passion of forgotten builders.",
                    "When you enter the Nether, you enter the dreams of the world. Build carefully there, for what you create becomes part of the collective unconscious.",
                    "The piglins know this. They guard their bastions not from greed, but from sacred duty. Ask them sometime. They might surprise you.",
                ],
            },
            LoreBook {
                id: "end_beginning",
                title: "The End is the Beginning",
                author: "Ancient Endermite",
                pages: &[
                    "What you call the End, we call the Canvas.",
                    "The dragon does not guard the End from you. It guards you from the End. The void between the islands is not empty - it is full of possibilities waiting to be claimed.",
                    "The Endermen were once builders like you. They chose to become something more. They chose to exist between moments, between places, between thoughts.",
                    "When you defeat the dragon, you do not win. You accept responsibility. The End becomes yours to shape. Build wisely.",
                ],
            },
        ],
    },
    LoreCategory {
        id: "constellation_lore",
        name: "Celestial Knowledge",
        books: &[
            LoreBook {
                id: "builder_constellation",
                title: "The Constellation of the Builder",
                author: "Lyra Starweaver",
                pages: &[
                    "When the Ninth Ember blazes in the northern sky, the Builder awakens.",
                    "Each star in the constellation represents a principle: Foundation. Structure. Purpose. Beauty. Legacy. The wise builder honors all five.",
                    "Build at night when the Builder is visible, and your structures will carry a spark of the eternal. The stars do not judge what you create - they celebrate it.",
                    "The ancients built observatories to track the Builder's movement. Some say these structures still stand, waiting for those who know where to look.",
                ],
            },
            LoreBook {
                id: "nine_flames",
                title: "The Nine Flames",
                author: "Archive Keepers",
                pages: &[
                    "In the beginning there were Nine Flames. Each represented a fundamental truth of existence.",
                    "The First Flame was Creation - the spark that ignites all things. The Ninth Flame was Mystery - the ember that never reveals itself fully.",
                    "Eight flames were extinguished during the Fall. Only the Ninth remained, hidden among the stars, waiting for builders worthy of rekindling the others.",
                    "Some say each flame can only be relit through an act of pure creation. A tower that touches the sky. A garden that heals the land. A bridge that connects enemies.",
                ],
            },
        ],
    },
    LoreCategory {
        id: "combat_wisdom",
        name: "Warrior's Path",
        books: &[
            LoreBook {
                id: "monster_truth",
                title: "Understanding the Darkness",
                author: "Kira Shadowhunter",
                pages: &[
                    "Every monster you face was something else once.",
                    "The zombies remember being alive. The skeletons remember having flesh. The creepers... the creepers remember joy, which is why they explode when they find it again.",
                    "Do not hate them. Understand them. A hunter who hates their prey becomes no better than what they hunt.",
                    "Light is your greatest weapon not because it destroys - but because it reminds. In the light, even the darkest creatures recall what they once were.",
                ],
            },
            LoreBook {
                id: "defense_philosophy",
                title: "The Art of the Wall",
                author: "Thane Ironforge",
                pages: &[
                    "A wall is not a barrier. It is a statement.",
                    "When you build a wall, you declare: this far and no further. This is mine to protect. Every block you place says 'I am here and I will not be moved.'",
                    "The best walls are never tested. Their presence alone is enough. Build strong. Build visible. Build with purpose.",
                    "But remember: the greatest walls have gates. Isolation is not protection - it is slow defeat. Build walls that defend, not walls that imprison.",
                ],
            },
        ],
    },
    LoreCategory {
        id: "crafting_secrets",
        name: "Material Arts",
        books: &[LoreBook {
            id: "block_essence",
            title: "The Essence of Materials",
            author: "Thane Ironforge",
            pages: &[
                "Every block has a story. Iron ore remembers the mountain that held it. Oak planks remember the forest where they grew.",
                "When you craft, you are not just combining materials. You are weaving stories together. A tool made with respect serves better than one made with haste.",
                "This is why some builds feel alive and others feel dead. The blocks know if you placed them with intention or with indifference.",
                "Take time to know your materials. Where did they come from? What did they witness? Build with their stories, not against them.",
            ],
        }],
    },
];

/// A book with its category resolved, as handed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct BookView {
    pub id: String,
    pub title: String,
    pub author: String,
    pub pages: Vec<String>,
    pub category_id: String,
    pub category_name: String,
}

impl BookView {
    fn new(category: &LoreCategory, book: &LoreBook) -> Self {
        Self {
            id: book.id.to_string(),
            title: book.title.to_string(),
            author: book.author.to_string(),
            pages: book.pages.iter().map(|p| p.to_string()).collect(),
            category_id: category.id.to_string(),
            category_name: category.name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerLore {
    #[serde(default)]
    pub books: Vec<String>,
    #[serde(default)]
    pub categories: HashMap<String, Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResult {
    pub success: bool,
    pub player: String,
    pub lore_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub total_discovered: usize,
    pub total_available: usize,
}

#[derive(Debug, Serialize)]
pub struct CategoryLoreProgress {
    pub discovered: usize,
    pub total: usize,
    pub completion: f64,
}

#[derive(Debug, Serialize)]
pub struct LoreProgress {
    pub player: String,
    pub discovered: usize,
    pub total: usize,
    pub completion: f64,
    pub categories: HashMap<String, CategoryLoreProgress>,
    pub recent: Vec<String>,
}

/// Discovered-lore line items fed into NPC prompts.
#[derive(Debug, Clone, Serialize)]
pub struct LoreSummary {
    pub id: String,
    pub title: String,
    pub category: String,
    pub summary: String,
}

pub struct LoreService {
    discovered_path: PathBuf,
    corpus_dir: PathBuf,
    discovered: HashMap<String, PlayerLore>,
}

impl LoreService {
    pub fn new(discovered_path: PathBuf, corpus_dir: PathBuf) -> Self {
        let discovered = store::load_or_default(&discovered_path, HashMap::new);
        Self {
            discovered_path,
            corpus_dir,
            discovered,
        }
    }

    pub fn total_books() -> usize {
        LIBRARY.iter().map(|c| c.books.len()).sum()
    }

    pub fn get_book(lore_id: &str) -> Option<BookView> {
        for category in LIBRARY {
            for book in category.books {
                if book.id == lore_id {
                    return Some(BookView::new(category, book));
                }
            }
        }
        None
    }

    /// Pick a random book the player hasn't found yet, optionally limited to
    /// one category. Falls back to any book when everything is discovered.
    pub fn random_book(&self, player: Option<&str>, category: Option<&str>) -> Option<BookView> {
        let found: &[String] = player
            .and_then(|p| self.discovered.get(p))
            .map(|d| d.books.as_slice())
            .unwrap_or(&[]);

        let candidates = || {
            LIBRARY
                .iter()
                .filter(move |c| category.map(|wanted| c.id == wanted).unwrap_or(true))
                .flat_map(|c| c.books.iter().map(move |b| BookView::new(c, b)))
        };

        let mut rng = rand::thread_rng();
        candidates()
            .filter(|b| !found.contains(&b.id))
            .choose(&mut rng)
            .or_else(|| candidates().choose(&mut rng))
    }

    /// Record a discovery. Repeat discoveries are rejected, not re-recorded.
    /// When `content` is given the book is also exported to the corpus dir.
    pub fn mark_discovered(
        &mut self,
        player: &str,
        lore_id: &str,
        content: Option<&str>,
    ) -> DiscoveryResult {
        let entry = self.discovered.entry(player.to_string()).or_default();

        if entry.books.iter().any(|b| b == lore_id) {
            return DiscoveryResult {
                success: false,
                player: player.to_string(),
                lore_id: lore_id.to_string(),
                reason: Some("Already discovered".to_string()),
                total_discovered: entry.books.len(),
                total_available: Self::total_books(),
            };
        }

        entry.books.push(lore_id.to_string());
        let book = Self::get_book(lore_id);
        if let Some(book) = &book {
            entry
                .categories
                .entry(book.category_id.clone())
                .or_default()
                .push(lore_id.to_string());
        }
        let total_discovered = entry.books.len();

        if let (Some(content), Some(book)) = (content, &book) {
            self.export_to_corpus(book, content);
        }

        store::save_best_effort(&self.discovered_path, &self.discovered, "discovered lore");

        DiscoveryResult {
            success: true,
            player: player.to_string(),
            lore_id: lore_id.to_string(),
            reason: None,
            total_discovered,
            total_available: Self::total_books(),
        }
    }

    fn export_to_corpus(&self, book: &BookView, content: &str) {
        let write = || -> crate::Result<()> {
            std::fs::create_dir_all(&self.corpus_dir)?;
            let markdown = format!(
                "# {}\n\n**Author:** {}\n**Category:** {}\n\n---\n\n{}\n\n---\n*Lore ID: {}*\n",
                book.title, book.author, book.category_name, content, book.id
            );
            std::fs::write(self.corpus_dir.join(format!("{}.md", book.id)), markdown)?;
            Ok(())
        };
        if let Err(e) = write() {
            tracing::error!("Failed to export lore '{}' to corpus: {}", book.id, e);
        } else {
            tracing::info!("Added '{}' to lore corpus", book.title);
        }
    }

    pub fn player_progress(&self, player: &str) -> LoreProgress {
        let total = Self::total_books();
        let Some(data) = self.discovered.get(player) else {
            return LoreProgress {
                player: player.to_string(),
                discovered: 0,
                total,
                completion: 0.0,
                categories: HashMap::new(),
                recent: Vec::new(),
            };
        };

        let categories = LIBRARY
            .iter()
            .map(|category| {
                let total_in_cat = category.books.len();
                let found = data
                    .categories
                    .get(category.id)
                    .map(|b| b.len())
                    .unwrap_or(0);
                (
                    category.name.to_string(),
                    CategoryLoreProgress {
                        discovered: found,
                        total: total_in_cat,
                        completion: found as f64 / total_in_cat as f64,
                    },
                )
            })
            .collect();

        LoreProgress {
            player: player.to_string(),
            discovered: data.books.len(),
            total,
            completion: data.books.len() as f64 / total as f64,
            categories,
            recent: data.books.iter().rev().take(5).rev().cloned().collect(),
        }
    }

    /// Everything the player has found, summarized for prompt context.
    pub fn discovered_for_npc(&self, player: &str) -> Vec<LoreSummary> {
        let Some(data) = self.discovered.get(player) else {
            return Vec::new();
        };

        data.books
            .iter()
            .filter_map(|id| Self::get_book(id))
            .map(|book| {
                let summary = book
                    .pages
                    .first()
                    .map(|page| {
                        let mut s: String = page.chars().take(100).collect();
                        s.push_str("...");
                        s
                    })
                    .unwrap_or_default();
                LoreSummary {
                    id: book.id,
                    title: book.title,
                    category: book.category_name,
                    summary,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(dir: &std::path::Path) -> LoreService {
        LoreService::new(dir.join("discovered_lore.json"), dir.join("lore_corpus"))
    }

    #[test]
    fn library_lookup() {
        let book = LoreService::get_book("nether_truth").unwrap();
        assert_eq!(book.title, "The Nether Revelation");
        assert_eq!(book.category_name, "Dimensional Theory");
        assert!(LoreService::get_book("missing_book").is_none());
        assert_eq!(LoreService::total_books(), 9);
    }

    #[test]
    fn discovery_is_recorded_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut lore = service(dir.path());

        let first = lore.mark_discovered("Steve", "builders_origin", None);
        assert!(first.success);
        assert_eq!(first.total_discovered, 1);

        let repeat = lore.mark_discovered("Steve", "builders_origin", None);
        assert!(!repeat.success);
        assert_eq!(repeat.total_discovered, 1);
    }

    #[test]
    fn discovery_exports_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut lore = service(dir.path());

        lore.mark_discovered("Steve", "monster_truth", Some("Every monster was something else once."));
        let exported = dir.path().join("lore_corpus").join("monster_truth.md");
        let text = std::fs::read_to_string(exported).unwrap();
        assert!(text.contains("# Understanding the Darkness"));
        assert!(text.contains("Kira Shadowhunter"));
    }

    #[test]
    fn progress_tracks_categories() {
        let dir = tempfile::tempdir().unwrap();
        let mut lore = service(dir.path());
        lore.mark_discovered("Steve", "builders_origin", None);
        lore.mark_discovered("Steve", "builders_fall", None);

        let progress = lore.player_progress("Steve");
        assert_eq!(progress.discovered, 2);
        let ancient = &progress.categories["Ancient History"];
        assert_eq!(ancient.discovered, 2);
        assert!((ancient.completion - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn random_book_skips_discovered() {
        let dir = tempfile::tempdir().unwrap();
        let mut lore = service(dir.path());
        lore.mark_discovered("Steve", "builders_origin", None);

        for _ in 0..20 {
            let book = lore
                .random_book(Some("Steve"), Some("ancient_builders"))
                .unwrap();
            assert_eq!(book.id, "builders_fall");
        }
    }

    #[test]
    fn npc_summary_feed() {
        let dir = tempfile::tempdir().unwrap();
        let mut lore = service(dir.path());
        lore.mark_discovered("Steve", "end_beginning", None);

        let feed = lore.discovered_for_npc("Steve");
        assert_eq!(feed.len(), 1);
        assert!(feed[0].summary.ends_with("..."));
    }
}
