//! Static catalogs: unlockable badges, placement subjects, and the built-in
//! topic bank the adaptive selection engine draws from.

use crate::domain::{Badge, TopicEntry};

/// Subjects covered by the one-time placement test (two questions each).
pub const PLACEMENT_SUBJECTS: [&str; 6] = [
  "Português",
  "Matemática",
  "Ciências",
  "História",
  "Geografia",
  "Lógica",
];

/// Subject label for tutor-authored activities with no recognizable subject.
pub const CUSTOM_SUBJECT: &str = "Personalizada";

pub const BADGE_FIRST_ACTIVITY: &str = "first_activity";
pub const BADGE_PERFECT_SCORE: &str = "perfect_score";
pub const BADGE_THREE_COMPLETED: &str = "three_completed";

/// The closed badge catalog. Unlock conditions live in the reward engine;
/// these records are only id + presentation text.
pub fn badge_catalog() -> Vec<Badge> {
  vec![
    Badge {
      id: BADGE_FIRST_ACTIVITY.into(),
      name: "Primeiros Passos".into(),
      description: "Concluiu sua primeira atividade.".into(),
    },
    Badge {
      id: BADGE_PERFECT_SCORE.into(),
      name: "Mestre do Saber".into(),
      description: "Conseguiu uma pontuação perfeita em uma atividade.".into(),
    },
    Badge {
      id: BADGE_THREE_COMPLETED.into(),
      name: "Trio de Sucesso".into(),
      description: "Concluiu 3 atividades.".into(),
    },
  ]
}

/// Resolve a badge id to its full catalog record.
pub fn badge_by_id(id: &str) -> Option<Badge> {
  badge_catalog().into_iter().find(|b| b.id == id)
}

/// Built-in topic bank. The TOML config may append its own entries on top.
pub fn default_topics() -> Vec<TopicEntry> {
  [
    ("Matemática", "Operações com frações"),
    ("Português", "Identificação de sujeito e predicado"),
    ("Ciências", "O ciclo da água na natureza"),
    ("História", "As Grandes Navegações"),
    ("Geografia", "Biomas do Brasil"),
    ("Matemática", "Cálculo de área e perímetro"),
    ("Português", "Uso de pontuação (vírgula e ponto final)"),
    ("Ciências", "O sistema solar"),
    ("Matemática", "Problemas de lógica com números"),
    ("Português", "Interpretação de fábulas"),
  ]
  .into_iter()
  .map(|(subject, topic)| TopicEntry { subject: subject.into(), topic: topic.into() })
  .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn badge_catalog_is_closed_and_resolvable() {
    let catalog = badge_catalog();
    assert_eq!(catalog.len(), 3);
    for badge in &catalog {
      assert_eq!(badge_by_id(&badge.id).map(|b| b.name), Some(badge.name.clone()));
    }
    assert!(badge_by_id("unknown_badge").is_none());
  }

  #[test]
  fn default_topics_cover_only_known_subjects() {
    for entry in default_topics() {
      assert!(PLACEMENT_SUBJECTS.contains(&entry.subject.as_str()), "{}", entry.subject);
    }
  }
}
