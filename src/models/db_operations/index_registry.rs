use crate::models::db_operations::{albums_db_operations, articles_db_operations, images_db_operations, DbResult};
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};

/// Index name -> description of the indexed fields.
pub const INDEX_REGISTRY: TableDefinition<&str, &str> = TableDefinition::new("index_registry");

type Rebuild = fn(&WriteTransaction) -> DbResult<usize>;

struct IndexGroup {
    rebuild: Rebuild,
    indexes: &'static [(&'static str, &'static str)],
}

const INDEX_GROUPS: &[IndexGroup] = &[
    IndexGroup {
        rebuild: images_db_operations::rebuild_indexes_in,
        indexes: &[
            ("image_url_unique", "images.cos_url (unique)"),
            ("image_tag_index", "images.tags, images.uploaded_at"),
            ("image_uploaded_index", "images.uploaded_at"),
        ],
    },
    IndexGroup {
        rebuild: albums_db_operations::rebuild_indexes_in,
        indexes: &[
            ("album_created_index", "albums.created_at"),
            ("album_text_index", "albums.title, albums.description"),
            ("album_author_index", "albums.author, albums.created_at"),
            ("album_tag_index", "albums.tags, albums.created_at"),
            ("album_visibility_index", "albums.visibility, albums.created_at"),
            ("album_cover_index", "albums.cover_image"),
            ("album_image_ref_index", "albums.image_refs.image_id"),
        ],
    },
    IndexGroup {
        rebuild: articles_db_operations::rebuild_indexes_in,
        indexes: &[("article_token_index", "articles.title_words, articles.md_words")],
    },
];

/// Builds every index that is not yet registered. Safe to run repeatedly.
/// Returns the names of the indexes created by this call.
pub fn ensure_indexes(db: &Database) -> DbResult<Vec<&'static str>> {
    let write_txn = db.begin_write()?;
    let mut created = Vec::new();
    {
        for group in INDEX_GROUPS {
            let missing: Vec<(&'static str, &'static str)> = {
                let registry = write_txn.open_table(INDEX_REGISTRY)?;
                let mut missing = Vec::new();
                for (name, fields) in group.indexes {
                    if registry.get(*name)?.is_some() {
                        log::info!("Skipped existing index {}", name);
                    } else {
                        missing.push((*name, *fields));
                    }
                }
                missing
            };
            if missing.is_empty() {
                continue;
            }

            (group.rebuild)(&write_txn)?;
            let mut registry = write_txn.open_table(INDEX_REGISTRY)?;
            // A rebuild covers the whole group.
            for (name, fields) in group.indexes {
                registry.insert(*name, *fields)?;
            }
            for (name, _) in missing {
                log::info!("Created index {}", name);
                created.push(name);
            }
        }
    }
    write_txn.commit()?;
    Ok(created)
}

/// Rebuilds every index from the stored documents.
pub fn reindex_all(db: &Database) -> DbResult<usize> {
    let write_txn = db.begin_write()?;
    let mut documents = 0;
    {
        for group in INDEX_GROUPS {
            documents += (group.rebuild)(&write_txn)?;
            let mut registry = write_txn.open_table(INDEX_REGISTRY)?;
            for (name, fields) in group.indexes {
                registry.insert(*name, *fields)?;
                log::info!("Rebuilt index {}", name);
            }
        }
    }
    write_txn.commit()?;
    Ok(documents)
}

pub fn registered_indexes(db: &Database) -> DbResult<Vec<(String, String)>> {
    let read_txn = db.begin_read()?;
    let registry = read_txn.open_table(INDEX_REGISTRY)?;
    let mut out = Vec::new();
    for item in registry.iter()? {
        let (name, fields) = item?;
        out.push((name.value().to_string(), fields.value().to_string()));
    }
    Ok(out)
}
