//! Lazy iteration over collection members.

use conformance_client::{Auth, HttpClient};
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::collections::VecDeque;

/// Extracts the member `@odata.id` links from a collection payload.
pub fn member_urls(payload: &Value) -> Vec<String> {
    payload
        .get("Members")
        .and_then(Value::as_array)
        .map(|members| {
            members
                .iter()
                .filter_map(|m| m.get("@odata.id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Where a member iteration starts from.
pub enum MemberSource {
    /// Collection URL; the first `next` call fetches the collection.
    Url(String),
    /// Already-fetched collection payload.
    Payload(Value),
}

enum IterState {
    Pending(MemberSource),
    Iterating {
        queue: VecDeque<String>,
        next_link: Option<String>,
    },
    Done,
}

/// Lazily GETs each member of a collection, following
/// `Members@odata.nextLink` pages as iteration crosses page boundaries.
///
/// A member fetch that fails is skipped with a warning rather than ending the
/// iteration; rules inspecting many members prefer partial results. A zero-
/// member collection yields nothing. Nothing is cached: constructing a fresh
/// iterator re-fetches, reflecting current server state.
pub struct MemberIter<'a> {
    client: &'a HttpClient,
    state: IterState,
}

impl<'a> MemberIter<'a> {
    pub fn new(client: &'a HttpClient, source: MemberSource) -> Self {
        Self {
            client,
            state: IterState::Pending(source),
        }
    }

    /// Fetches and returns the next member payload with its headers.
    pub async fn next(&mut self) -> Option<(Value, HeaderMap)> {
        loop {
            match std::mem::replace(&mut self.state, IterState::Done) {
                IterState::Pending(source) => {
                    let payload = match source {
                        MemberSource::Payload(payload) => Some(payload),
                        MemberSource::Url(url) => self.fetch_page(&url).await,
                    };
                    match payload {
                        Some(payload) => {
                            self.state = IterState::Iterating {
                                queue: member_urls(&payload).into(),
                                next_link: page_next_link(&payload),
                            };
                        }
                        None => return None,
                    }
                }
                IterState::Iterating {
                    mut queue,
                    mut next_link,
                } => {
                    let url = match queue.pop_front() {
                        Some(url) => url,
                        None => match next_link.take() {
                            Some(page_url) => {
                                // Page exhausted; pull the next one.
                                self.state = match self.fetch_page(&page_url).await {
                                    Some(page) => IterState::Iterating {
                                        queue: member_urls(&page).into(),
                                        next_link: page_next_link(&page),
                                    },
                                    None => IterState::Done,
                                };
                                continue;
                            }
                            None => return None,
                        },
                    };

                    self.state = IterState::Iterating { queue, next_link };

                    match self.client.get(&url, Auth::Basic).await {
                        Ok(response) if response.is_success() && response.payload.is_some() => {
                            let payload = response.payload.unwrap_or(Value::Null);
                            return Some((payload, response.headers));
                        }
                        Ok(response) => {
                            tracing::warn!(
                                %url,
                                status = ?response.status_u16(),
                                "skipping member that did not fetch"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(%url, error = %e, "skipping member after client error");
                        }
                    }
                }
                IterState::Done => return None,
            }
        }
    }

    async fn fetch_page(&self, url: &str) -> Option<Value> {
        match self.client.get(url, Auth::Basic).await {
            Ok(response) if response.is_success() => response.payload,
            Ok(response) => {
                tracing::warn!(%url, status = ?response.status_u16(), "collection page did not fetch");
                None
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "collection page client error");
                None
            }
        }
    }
}

fn page_next_link(payload: &Value) -> Option<String> {
    payload
        .get("Members@odata.nextLink")
        .and_then(Value::as_str)
        .map(str::to_string)
}
