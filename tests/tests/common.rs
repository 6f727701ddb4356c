//! Shared fixtures for the end-to-end scenarios in `spec.md` §8: an
//! in-memory, `Mutex`-backed stand-in for the five fetcher/mutator
//! callbacks a real application would point at a network.

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use ripple::{CollectionParams, DeleteOutcome, EntityId, FetchError, Fetchers, RequestParams};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Widget {
    pub id: String,
    pub name: String,
    pub value: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Aged {
    pub id: String,
    pub age: Option<i64>,
}

/// Backs every fetcher/mutator with an in-memory table keyed by `id`.
/// `fetch_item` on a missing id fails, matching a real 404.
pub struct InMemoryFetchers<E> {
    pub rows: Mutex<Vec<E>>,
}

impl<E: Clone> InMemoryFetchers<E> {
    pub fn new(rows: Vec<E>) -> Self { Self { rows: Mutex::new(rows) } }
}

#[async_trait]
impl Fetchers<Widget> for InMemoryFetchers<Widget> {
    async fn fetch_collection(&self, _: &CollectionParams, _: &RequestParams) -> Result<Vec<Widget>, FetchError> {
        Ok(self.rows.lock().unwrap().clone())
    }
    async fn fetch_item(&self, id: &EntityId, _: Option<&serde_json::Value>, _: &RequestParams) -> Result<Widget, FetchError> {
        self.rows.lock().unwrap().iter().find(|w| w.id == id.to_string()).cloned().ok_or_else(|| "not found".into())
    }
    async fn create_item(&self, partial: Widget, _: &RequestParams) -> Result<Widget, FetchError> {
        self.rows.lock().unwrap().push(partial.clone());
        Ok(partial)
    }
    async fn update_item(&self, item: Widget, _: &RequestParams) -> Result<Widget, FetchError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|w| w.id == item.id) {
            Some(existing) => *existing = item.clone(),
            None => rows.push(item.clone()),
        }
        Ok(item)
    }
    async fn delete_item(&self, id: &EntityId, _: &RequestParams) -> Result<DeleteOutcome, FetchError> {
        self.rows.lock().unwrap().retain(|w| w.id != id.to_string());
        Ok(DeleteOutcome { id: id.clone(), success: true })
    }
}

#[async_trait]
impl Fetchers<Aged> for InMemoryFetchers<Aged> {
    async fn fetch_collection(&self, _: &CollectionParams, _: &RequestParams) -> Result<Vec<Aged>, FetchError> {
        Ok(self.rows.lock().unwrap().clone())
    }
    async fn fetch_item(&self, id: &EntityId, _: Option<&serde_json::Value>, _: &RequestParams) -> Result<Aged, FetchError> {
        self.rows.lock().unwrap().iter().find(|w| w.id == id.to_string()).cloned().ok_or_else(|| "not found".into())
    }
    async fn create_item(&self, partial: Aged, _: &RequestParams) -> Result<Aged, FetchError> {
        self.rows.lock().unwrap().push(partial.clone());
        Ok(partial)
    }
    async fn update_item(&self, item: Aged, _: &RequestParams) -> Result<Aged, FetchError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|w| w.id == item.id) {
            Some(existing) => *existing = item.clone(),
            None => rows.push(item.clone()),
        }
        Ok(item)
    }
    async fn delete_item(&self, id: &EntityId, _: &RequestParams) -> Result<DeleteOutcome, FetchError> {
        self.rows.lock().unwrap().retain(|w| w.id != id.to_string());
        Ok(DeleteOutcome { id: id.clone(), success: true })
    }
}
