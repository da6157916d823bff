use crate::helper::ServiceResult;
use crate::models::db_operations::{images_db_operations as images, tags_db_operations as tags};
use crate::models::{NewTag, ObjectId, Outcome, Tag};
use redb::Database;
use serde::Serialize;
use std::collections::HashSet;

/// Tag changes between two tag lists, compared by normalized name.
#[derive(Debug, Serialize, PartialEq, Eq, Default)]
pub struct TagDiff {
    pub removed: Vec<String>,
    pub added: Vec<String>,
}

pub fn diff_tags(old: &[String], new: &[String]) -> TagDiff {
    let old_ids: HashSet<String> = old.iter().map(|t| Tag::normalize_id(t)).collect();
    let new_ids: HashSet<String> = new.iter().map(|t| Tag::normalize_id(t)).collect();

    let mut diff = TagDiff::default();
    let mut seen = HashSet::new();
    for tag in old {
        let id = Tag::normalize_id(tag);
        if !id.is_empty() && !new_ids.contains(&id) && seen.insert(id) {
            diff.removed.push(tag.trim().to_string());
        }
    }
    for tag in new {
        let id = Tag::normalize_id(tag);
        if !id.is_empty() && !old_ids.contains(&id) && seen.insert(id) {
            diff.added.push(tag.trim().to_string());
        }
    }
    diff
}

/// Gets or creates each tag and lists the image under it. Failures become warnings.
pub fn attach_tags<T>(db: &Database, image_id: ObjectId, image_name: &str, names: &[String], outcome: &mut Outcome<T>) {
    for name in names {
        let tag = match tags::get_or_create_tag(db, name, name, "") {
            Ok(tag) => tag,
            Err(e) => {
                outcome.warn(format!("could not resolve tag '{}': {}", name, e));
                continue;
            }
        };
        if let Err(e) = tags::add_image_to_tag(db, &tag.id, image_id, image_name) {
            outcome.warn(format!("could not add image {} to tag '{}': {}", image_id, tag.id, e));
        }
    }
}

/// Brings the tag documents in line with an image's tag change: one removal per
/// dropped tag, one get-or-create plus add per new tag. Best effort.
pub fn sync_image_tags(
    db: &Database,
    image_id: ObjectId,
    image_name: &str,
    old: &[String],
    new: &[String],
) -> Outcome<TagDiff> {
    let diff = diff_tags(old, new);
    let mut outcome = Outcome::new(TagDiff::default());
    for name in &diff.removed {
        if let Err(e) = tags::remove_image_from_tag(db, &Tag::normalize_id(name), image_id) {
            outcome.warn(format!("could not remove image {} from tag '{}': {}", image_id, name, e));
        }
    }
    attach_tags(db, image_id, image_name, &diff.added, &mut outcome);
    outcome.value = diff;
    outcome
}

/// Stores the new tag list on the image, then syncs the tag documents.
pub fn update_image_tags(db: &Database, image_id: ObjectId, new_tags: Vec<String>) -> ServiceResult<Outcome<TagDiff>> {
    let new_tags = dedup_tags(&new_tags);
    let image = images::get_image(db, image_id)?;
    let old_tags = images::set_tags(db, image_id, new_tags.clone())?;
    Ok(sync_image_tags(db, image_id, &image.name, &old_tags, &new_tags))
}

/// Trimmed tags without empties or case-insensitive duplicates, first spelling wins.
pub fn dedup_tags(input: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    input
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(Tag::normalize_id(t)))
        .collect()
}

/// Creates every tag it can. Returns the ids created; failures become warnings.
pub fn batch_create_tags(db: &Database, inputs: Vec<NewTag>) -> Outcome<Vec<String>> {
    let mut outcome = Outcome::new(Vec::new());
    for input in inputs {
        let name = input.name.clone();
        match tags::create_tag(db, input) {
            Ok(tag) => outcome.value.push(tag.id),
            Err(e) => outcome.warn(format!("could not create tag '{}': {}", name, e)),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::images_db_operations::tests::sample_image;
    use crate::models::db_operations::test_support::temp_db;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn diff_touches_only_changed_tags() {
        let diff = diff_tags(&strings(&["a", "b"]), &strings(&["b", "c"]));
        assert_eq!(diff, TagDiff { removed: strings(&["a"]), added: strings(&["c"]) });
    }

    #[test]
    fn diff_ignores_case() {
        let diff = diff_tags(&strings(&["Sunset"]), &strings(&["sunset", "Beach"]));
        assert_eq!(diff, TagDiff { removed: vec![], added: strings(&["Beach"]) });
    }

    #[test]
    fn update_moves_image_between_tags() {
        let (_dir, db) = temp_db();
        let image = sample_image("shore", &["a", "b"]);
        images::insert_image(&db, &image).unwrap();
        let mut seed = Outcome::new(());
        attach_tags(&db, image.id, &image.name, &image.tags, &mut seed);
        assert!(seed.is_clean());

        let outcome = update_image_tags(&db, image.id, strings(&["b", "c"])).unwrap();
        assert!(outcome.is_clean());
        assert_eq!(tags::get_tag(&db, "a").unwrap().image_count, 0);
        assert_eq!(tags::get_tag(&db, "b").unwrap().image_count, 1);
        assert_eq!(tags::get_tag(&db, "c").unwrap().image_count, 1);
        assert_eq!(images::get_image(&db, image.id).unwrap().tags, strings(&["b", "c"]));
    }

    #[test]
    fn batch_create_reports_conflicts_as_warnings() {
        let (_dir, db) = temp_db();
        let inputs = vec![
            NewTag { name: "Sky".to_string(), ..NewTag::default() },
            NewTag { name: "sky".to_string(), ..NewTag::default() },
            NewTag { name: "sea".to_string(), ..NewTag::default() },
        ];
        let outcome = batch_create_tags(&db, inputs);
        assert_eq!(outcome.value, strings(&["sky", "sea"]));
        assert_eq!(outcome.warnings.len(), 1);
    }
}
