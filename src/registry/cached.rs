//! Generic cached registry
//!
//! [`CachedRegistry`] implements everything the entity kinds share: the
//! name/id mapping, cached reads, listing, generic insert and removal, and
//! the write-through `updated`/`registered` notifications. Entity modules
//! add their own operations as inherent impls on `CachedRegistry<XCodec>`.

use super::{Ctx, ObjectCache, column, lookup_id, lookup_name, name_column};
use crate::name::{EntityName, ObjectId};
use crate::notify::AnyDescription;
use crate::storage::RelationalStore;
use crate::{Error, Result};
use rusqlite::types::Value;
use rusqlite::{Row, ToSql, named_params};
use std::fmt;
use std::sync::Arc;

/// Entity-specific half of a registry: row layout and conversions.
pub trait EntityCodec {
    type Name: EntityName;
    type Description: fmt::Debug + Send + Sync + 'static;

    /// Entity columns stored after `id, name, info`
    const COLUMNS: &'static [&'static str];

    /// Build a description from a full row (`id, name, info` and `COLUMNS`)
    fn decode(&self, store: &RelationalStore, row: &Row<'_>) -> Result<Self::Description>;

    /// Values for `COLUMNS`, resolving foreign keys; fails before any write
    fn encode(&self, store: &RelationalStore, description: &Self::Description) -> Result<Vec<(&'static str, Value)>>;

    fn name_of(description: &Self::Description) -> Self::Name;

    fn info_of(description: &Self::Description) -> &str;

    /// Wrap a description for an `Updated` notification
    fn describe(description: Arc<Self::Description>) -> AnyDescription;

    /// Name given to a newly inserted row
    fn assign_name(&self, _description: &Self::Description) -> Self::Name {
        Self::Name::generate()
    }
}

struct Queries {
    table: &'static str,
    list: String,
    one: String,
    all: String,
    insert: String,
    delete: String,
}

impl Queries {
    fn new(table: &'static str, columns: &[&str]) -> Self {
        let fields = std::iter::once("id, name, info".to_string())
            .chain(columns.iter().map(|c| c.to_string()))
            .collect::<Vec<_>>()
            .join(", ");
        let insert_columns = std::iter::once("name, info".to_string())
            .chain(columns.iter().map(|c| c.to_string()))
            .collect::<Vec<_>>()
            .join(", ");
        let insert_values = std::iter::once(":name, :info".to_string())
            .chain(columns.iter().map(|c| format!(":{}", c)))
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            table,
            list: format!("SELECT name FROM {} ORDER BY id", table),
            one: format!("SELECT {} FROM {} WHERE name = :name", fields, table),
            all: format!("SELECT {} FROM {} ORDER BY id", fields, table),
            insert: format!("INSERT INTO {} ({}) VALUES ({})", table, insert_columns, insert_values),
            delete: format!("DELETE FROM {} WHERE name = :name", table),
        }
    }
}

/// Cache plus generic SQL for one entity kind.
pub struct CachedRegistry<C: EntityCodec> {
    pub(crate) codec: C,
    cache: ObjectCache<C::Name, Arc<C::Description>>,
    sql: Queries,
}

impl<C: EntityCodec> CachedRegistry<C> {
    pub fn new(codec: C) -> Self {
        let table = <C::Name as EntityName>::KIND.table();
        Self {
            codec,
            cache: ObjectCache::new(),
            sql: Queries::new(table, C::COLUMNS),
        }
    }

    pub fn table(&self) -> &'static str {
        self.sql.table
    }

    /// Number of cached descriptions
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    // ========== Reads ==========

    /// Fetch one object by name; served from cache unless `force`
    pub fn get_one(
        &mut self,
        store: &RelationalStore,
        name: &C::Name,
        force: bool,
    ) -> Result<(ObjectId, Arc<C::Description>)> {
        if !force {
            if let Some((id, value)) = self.cache.get_by_name(name) {
                return Ok((id, Arc::clone(value)));
            }
        }

        let codec = &self.codec;
        let row = store.query_opt(
            &self.sql.one,
            named_params! { ":name": name.to_name_string() },
            |row| Ok((row.get::<_, ObjectId>("id")?, codec.decode(store, row))),
        )?;

        let Some((id, decoded)) = row else {
            self.cache.remove_name(name);
            return Err(Error::NotFound);
        };

        match decoded {
            Ok(description) => {
                let description = Arc::new(description);
                self.cache.add(id, *name, Arc::clone(&description));
                Ok((id, description))
            }
            Err(e) => {
                tracing::warn!("{} {}: {}", self.sql.table, name, e);
                self.cache.remove_name(name);
                Err(Error::InconsistentData(format!("{} {}: {}", self.sql.table, name, e)))
            }
        }
    }

    /// Fetch one object by row id
    pub fn get_one_by_id(&mut self, store: &RelationalStore, id: ObjectId) -> Result<Arc<C::Description>> {
        if let Some(value) = self.cache.get_by_id(id) {
            return Ok(Arc::clone(value));
        }
        let name = self.get_name(store, id)?.ok_or(Error::NotFound)?;
        self.get_one(store, &name, false).map(|(_, d)| d)
    }

    /// Every object of this kind; undecodable rows are evicted and skipped
    pub fn get_all(&mut self, store: &RelationalStore) -> Result<Vec<Arc<C::Description>>> {
        let codec = &self.codec;
        let cache = &self.cache;
        let rows = store
            .query_rows(&self.sql.all, &[], |row| {
                let id: ObjectId = row.get("id")?;
                if let Some(cached) = cache.get_by_id(id) {
                    return Ok((id, Ok(Arc::clone(cached))));
                }
                let decoded = codec.decode(store, row).map(Arc::new);
                Ok((id, decoded))
            })
            .map_err(|e| Error::CantGet(e.to_string()))?;

        let mut all = Vec::with_capacity(rows.len());
        for (id, decoded) in rows {
            match decoded {
                Ok(description) => {
                    if !self.cache.contains_id(id) {
                        self.cache.add(id, C::name_of(&description), Arc::clone(&description));
                    }
                    all.push(description);
                }
                Err(e) => {
                    tracing::warn!("invalid {} row {} skipped: {}", self.sql.table, id, e);
                    self.cache.remove_id(id);
                }
            }
        }
        Ok(all)
    }

    /// Names of every object of this kind
    pub fn get_list(&self, store: &RelationalStore) -> Result<Vec<C::Name>> {
        let rows: Vec<String> = store
            .query_rows(&self.sql.list, &[], |row| row.get(0))
            .map_err(|e| Error::CantGet(e.to_string()))?;
        Ok(rows
            .iter()
            .filter_map(|text| match C::Name::parse(text) {
                Ok(name) => Some(name),
                Err(e) => {
                    tracing::warn!("invalid {} name skipped: {}", self.sql.table, e);
                    None
                }
            })
            .collect())
    }

    pub fn get_id(&self, store: &RelationalStore, name: &C::Name) -> Result<Option<ObjectId>> {
        lookup_id(store, name)
    }

    pub fn get_name(&self, store: &RelationalStore, id: ObjectId) -> Result<Option<C::Name>> {
        lookup_name(store, id)
    }

    // ========== Writes ==========

    /// Insert a new row built by the codec; no cache entry, no notification
    pub fn insert(&mut self, store: &RelationalStore, description: &C::Description) -> Result<(ObjectId, C::Name)> {
        let name = self.codec.assign_name(description);
        let mut values: Vec<(String, Value)> = vec![
            (":name".to_string(), Value::Text(name.to_name_string())),
            (":info".to_string(), Value::Text(C::info_of(description).to_string())),
        ];
        values.extend(
            self.codec
                .encode(store, description)?
                .into_iter()
                .map(|(column, value)| (format!(":{}", column), value)),
        );

        let params: Vec<(&str, &dyn ToSql)> = values
            .iter()
            .map(|(key, value)| (key.as_str(), value as &dyn ToSql))
            .collect();
        let id = store
            .insert(&self.sql.insert, &params)
            .map_err(|e| Error::CantRegister(e.to_string()))?;

        tracing::debug!("inserted {} {} as row {}", self.sql.table, name, id);
        Ok((id, name))
    }

    /// Evict and delete one row
    pub fn remove_one(&mut self, store: &RelationalStore, name: &C::Name) -> Result<()> {
        self.cache.remove_name(name);
        let deleted = store
            .execute(&self.sql.delete, named_params! { ":name": name.to_name_string() })
            .map_err(|e| Error::CantUnRegister(e.to_string()))?;
        if deleted == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    pub fn evict(&mut self, name: &C::Name) {
        self.cache.remove_name(name);
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    // ========== Notifications ==========

    /// Re-read `name` from the store and announce the fresh description
    pub fn updated(&mut self, ctx: &Ctx<'_>, name: &C::Name) -> Result<Arc<C::Description>> {
        let (_, description) = self.get_one(ctx.store, name, true)?;
        ctx.notifier.updated(C::describe(Arc::clone(&description)));
        Ok(description)
    }

    /// Announce that `name` appeared or disappeared; eviction on removal
    pub fn registered(&mut self, ctx: &Ctx<'_>, name: &C::Name, registered: bool) {
        if !registered {
            self.cache.remove_name(name);
        }
        ctx.notifier
            .registered(<C::Name as EntityName>::KIND, name.uuid(), registered);
    }

    /// Insert, re-read and announce; the common register path
    pub fn register(&mut self, ctx: &Ctx<'_>, description: &C::Description) -> Result<Arc<C::Description>> {
        let (id, name) = self.insert(ctx.store, description)?;
        let description = self.get_one_by_id(ctx.store, id)?;
        self.registered(ctx, &name, true);
        Ok(description)
    }
}

/// Read the `name` column of a full row
pub(crate) fn row_name<N: EntityName>(row: &Row<'_>) -> Result<N> {
    name_column(row, "name")
}

/// Read the `info` column of a full row
pub(crate) fn row_info(row: &Row<'_>) -> Result<String> {
    column(row, "info")
}
