use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use commerce_products::{ProductId, SellerId};

use crate::document::ProductDocument;
use crate::filter::group_filters;
use crate::options::{MAX_PAGE_SIZE, SearchOptions, SortField, SortOrder};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("search index unavailable: {0}")]
    Unavailable(String),
}

/// One hit, as returned to shoppers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: ProductId,
    pub seller_id: SellerId,
    pub name: String,
    pub brand: String,
    pub price: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPage {
    pub items: Vec<SearchResult>,
    /// Matches across all pages.
    pub total: usize,
    pub page: usize,
    pub size: usize,
}

pub trait SearchIndex: Send + Sync {
    /// Insert or replace the document with the same id.
    fn index(&self, doc: ProductDocument) -> Result<(), SearchError>;
    fn remove(&self, id: ProductId) -> Result<(), SearchError>;
    fn get(&self, id: ProductId) -> Result<Option<ProductDocument>, SearchError>;
    fn search(&self, options: &SearchOptions) -> Result<SearchPage, SearchError>;
    fn autocomplete(&self, prefix: &str, limit: usize) -> Result<Vec<String>, SearchError>;
}

impl<S> SearchIndex for Arc<S>
where
    S: SearchIndex + ?Sized,
{
    fn index(&self, doc: ProductDocument) -> Result<(), SearchError> {
        (**self).index(doc)
    }

    fn remove(&self, id: ProductId) -> Result<(), SearchError> {
        (**self).remove(id)
    }

    fn get(&self, id: ProductId) -> Result<Option<ProductDocument>, SearchError> {
        (**self).get(id)
    }

    fn search(&self, options: &SearchOptions) -> Result<SearchPage, SearchError> {
        (**self).search(options)
    }

    fn autocomplete(&self, prefix: &str, limit: usize) -> Result<Vec<String>, SearchError> {
        (**self).autocomplete(prefix, limit)
    }
}

/// Process-local index. Linear scan per query; sized for a single node.
#[derive(Debug, Default)]
pub struct InMemorySearchIndex {
    docs: RwLock<HashMap<ProductId, ProductDocument>>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> SearchError {
    SearchError::Unavailable("index lock poisoned".to_string())
}

impl SearchIndex for InMemorySearchIndex {
    fn index(&self, doc: ProductDocument) -> Result<(), SearchError> {
        let mut docs = self.docs.write().map_err(|_| poisoned())?;
        docs.insert(doc.id, doc);
        Ok(())
    }

    fn remove(&self, id: ProductId) -> Result<(), SearchError> {
        let mut docs = self.docs.write().map_err(|_| poisoned())?;
        docs.remove(&id);
        Ok(())
    }

    fn get(&self, id: ProductId) -> Result<Option<ProductDocument>, SearchError> {
        let docs = self.docs.read().map_err(|_| poisoned())?;
        Ok(docs.get(&id).cloned())
    }

    fn search(&self, options: &SearchOptions) -> Result<SearchPage, SearchError> {
        let docs = self.docs.read().map_err(|_| poisoned())?;

        let tokens = keyword_tokens(options.keyword.as_deref());
        let filter_groups = group_filters(&options.filters);

        let mut hits: Vec<(u32, &ProductDocument)> = docs
            .values()
            .filter(|d| d.is_searchable())
            .filter(|d| match options.category_id.as_deref().map(str::trim) {
                Some(c) if !c.is_empty() => d.category_id == c,
                _ => true,
            })
            .filter(|d| options.min_price.is_none_or(|min| d.base_price.amount() >= min))
            .filter(|d| options.max_price.is_none_or(|max| d.base_price.amount() <= max))
            .filter(|d| {
                filter_groups
                    .values()
                    .all(|alternatives| alternatives.iter().any(|t| d.attributes.contains(t)))
            })
            .filter_map(|d| {
                if tokens.is_empty() {
                    return Some((0, d));
                }
                let score = relevance(d, &tokens);
                (score > 0).then_some((score, d))
            })
            .collect();

        hits.sort_by(|(sa, a), (sb, b)| {
            let primary = match options.sort_field {
                SortField::Relevance => sa.cmp(sb).then_with(|| a.created_at.cmp(&b.created_at)),
                SortField::Price => a.base_price.amount().cmp(&b.base_price.amount()),
                SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            };
            let primary = match options.sort_order {
                SortOrder::Asc => primary,
                SortOrder::Desc => primary.reverse(),
            };
            match primary {
                Ordering::Equal => a.id.cmp(&b.id),
                other => other,
            }
        });

        let size = options.effective_size();
        let total = hits.len();
        let items = hits
            .into_iter()
            .skip(options.offset())
            .take(size)
            .map(|(_, d)| SearchResult {
                id: d.id,
                seller_id: d.seller_id.clone(),
                name: d.name.clone(),
                brand: d.brand.clone(),
                price: d.base_price.amount(),
            })
            .collect();

        Ok(SearchPage {
            items,
            total,
            page: options.page,
            size,
        })
    }

    fn autocomplete(&self, prefix: &str, limit: usize) -> Result<Vec<String>, SearchError> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() {
            return Ok(Vec::new());
        }
        let docs = self.docs.read().map_err(|_| poisoned())?;

        let matches: BTreeSet<&str> = docs
            .values()
            .filter(|d| d.is_searchable())
            .flat_map(|d| d.suggestions.iter())
            .filter(|s| s.to_lowercase().starts_with(&prefix))
            .map(String::as_str)
            .collect();

        Ok(matches
            .into_iter()
            .take(limit.clamp(1, MAX_PAGE_SIZE))
            .map(str::to_string)
            .collect())
    }
}

fn keyword_tokens(keyword: Option<&str>) -> Vec<String> {
    keyword
        .map(|k| k.split_whitespace().map(str::to_lowercase).collect())
        .unwrap_or_default()
}

/// Name hits weigh most, then brand, then category and description.
fn relevance(doc: &ProductDocument, tokens: &[String]) -> u32 {
    let name = doc.name.to_lowercase();
    let brand = doc.brand.to_lowercase();
    let description = doc.description.to_lowercase();
    let category = doc.category_id.to_lowercase();

    tokens
        .iter()
        .map(|t| {
            let mut score = 0;
            if name.contains(t.as_str()) {
                score += 3;
            }
            if brand.contains(t.as_str()) {
                score += 2;
            }
            if description.contains(t.as_str()) || category.contains(t.as_str()) {
                score += 1;
            }
            score
        })
        .sum()
}
