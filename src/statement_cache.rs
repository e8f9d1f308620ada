//! Client-side statement cache
//!
//! Caches parsed statements by SQL text so repeated executions reuse the
//! server cursor instead of re-parsing. Eviction is LRU; DDL is never
//! cached. The parse counter feeds the cache-behavior tests: N executions
//! of one SQL text must cost exactly one parse while caching is on.

use indexmap::IndexMap;
use std::time::Instant;

use crate::statement::Statement;

#[derive(Debug)]
struct CachedStatement {
    statement: Statement,
    in_use: bool,
    last_used: Instant,
}

/// LRU statement cache keyed by SQL text
#[derive(Debug)]
pub struct StatementCache {
    cache: IndexMap<String, CachedStatement>,
    max_size: usize,
    parse_count: u64,
    /// Cursor ids evicted from the cache, closed piggybacked on the next call
    cursors_to_close: Vec<u16>,
}

impl StatementCache {
    /// Create a cache holding up to `max_size` statements; 0 disables caching
    pub fn new(max_size: usize) -> Self {
        Self {
            cache: IndexMap::with_capacity(max_size),
            max_size,
            parse_count: 0,
            cursors_to_close: Vec::new(),
        }
    }

    /// Number of cached statements
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Number of parse rounds recorded on this session
    pub fn parse_count(&self) -> u64 {
        self.parse_count
    }

    /// Record one parse round trip
    pub fn record_parse(&mut self) {
        self.parse_count += 1;
    }

    /// Look up a statement, marking it in use and refreshing LRU order.
    ///
    /// Returns `None` on miss or when the cached copy is already in use by
    /// another cursor (the caller then parses a fresh statement).
    pub fn get(&mut self, sql: &str) -> Option<Statement> {
        if self.max_size == 0 {
            return None;
        }
        let index = self.cache.get_index_of(sql)?;
        // refresh LRU position
        self.cache.move_index(index, self.cache.len() - 1);
        let cached = self.cache.get_mut(sql)?;
        if cached.in_use {
            tracing::trace!(sql, "statement cached but in use, parsing fresh");
            return None;
        }
        cached.in_use = true;
        cached.last_used = Instant::now();
        tracing::trace!(sql, cursor_id = cached.statement.cursor_id(), "statement cache hit");
        Some(cached.statement.clone_for_reuse())
    }

    /// Store or update a statement after execution and release it for reuse
    pub fn put(&mut self, statement: Statement) {
        if self.max_size == 0 {
            return;
        }
        if statement.is_ddl() || statement.cursor_id() == 0 {
            return;
        }

        let sql = statement.sql().to_string();
        if let Some(cached) = self.cache.get_mut(&sql) {
            cached.statement = statement;
            cached.in_use = false;
            cached.last_used = Instant::now();
            return;
        }

        if self.cache.len() >= self.max_size {
            self.evict_lru();
        }
        self.cache.insert(
            sql,
            CachedStatement {
                statement,
                in_use: false,
                last_used: Instant::now(),
            },
        );
    }

    /// Release a statement without updating it (execution failed)
    pub fn release(&mut self, sql: &str) {
        if let Some(cached) = self.cache.get_mut(sql) {
            cached.in_use = false;
        }
    }

    /// Reset the cursor id of a cached statement after the server closed the
    /// cursor; the next execution re-parses
    pub fn mark_cursor_closed(&mut self, sql: &str) {
        if let Some(cached) = self.cache.get_mut(sql) {
            cached.statement.set_cursor_id(0);
            cached.statement.set_executed(false);
        }
    }

    /// Drain the cursor ids waiting to be closed on the server
    pub fn take_cursors_to_close(&mut self) -> Vec<u16> {
        std::mem::take(&mut self.cursors_to_close)
    }

    /// Clear the whole cache, queueing every live cursor for closing
    pub fn clear(&mut self) {
        for (_, cached) in self.cache.drain(..) {
            if cached.statement.cursor_id() != 0 {
                self.cursors_to_close.push(cached.statement.cursor_id());
            }
        }
    }

    /// Change the cache capacity, evicting as needed
    pub fn resize(&mut self, max_size: usize) {
        self.max_size = max_size;
        while self.cache.len() > self.max_size {
            self.evict_lru();
        }
    }

    fn evict_lru(&mut self) {
        // IndexMap keeps LRU order because get() moves hits to the back
        let evict_index = self
            .cache
            .iter()
            .enumerate()
            .filter(|(_, (_, c))| !c.in_use)
            .min_by_key(|(_, (_, c))| c.last_used)
            .map(|(i, _)| i);
        if let Some(index) = evict_index {
            if let Some((_, cached)) = self.cache.shift_remove_index(index) {
                if cached.statement.cursor_id() != 0 {
                    self.cursors_to_close.push(cached.statement.cursor_id());
                }
            }
        }
    }
}
