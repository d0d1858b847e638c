//! Fleet listing view: search, liveness filter, sort and paging

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::device::{Device, Foundness};

pub const DEFAULT_PER_PAGE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    /// Reported `Found`
    Online,
    /// Reported `Lost`; unknown liveness is neither online nor offline
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    Name,
    Status,
    LastPing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetQuery {
    /// Case-insensitive substring of the device name
    pub search: Option<String>,
    pub status: StatusFilter,
    pub sort: SortField,
    pub order: SortOrder,
    /// 1-based; `None` returns every match
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FleetPage<T> {
    pub items: Vec<T>,
    /// Matches before paging
    pub total: usize,
    pub page: usize,
    pub pages: usize,
}

impl FleetQuery {
    pub fn matches(&self, device: &Device) -> bool {
        let search_ok = match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => device
                .name()
                .to_lowercase()
                .contains(&needle.to_lowercase()),
        };
        let status_ok = match self.status {
            StatusFilter::All => true,
            StatusFilter::Online => device.foundness() == Foundness::Found,
            StatusFilter::Offline => device.foundness() == Foundness::Lost,
        };
        search_ok && status_ok
    }

    fn compare(&self, a: &Device, b: &Device) -> Ordering {
        let ordering = match self.sort {
            SortField::Name => a.name().cmp(b.name()),
            SortField::Status => online_rank(a).cmp(&online_rank(b)),
            // Never-seen devices sort as the oldest
            SortField::LastPing => a.last_updated().cmp(&b.last_updated()),
        };
        match self.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }

    /// Filter, sort (stable) and page `items`
    pub fn apply<T: AsRef<Device>>(&self, items: Vec<T>) -> FleetPage<T> {
        let mut matched: Vec<T> = items
            .into_iter()
            .filter(|item| self.matches(item.as_ref()))
            .collect();
        matched.sort_by(|a, b| self.compare(a.as_ref(), b.as_ref()));

        let total = matched.len();
        let Some(page) = self.page else {
            return FleetPage {
                items: matched,
                total,
                page: 1,
                pages: 1,
            };
        };

        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE).max(1);
        let pages = total.div_ceil(per_page).max(1);
        let page = page.clamp(1, pages);
        let items = matched
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect();
        FleetPage {
            items,
            total,
            page,
            pages,
        }
    }
}

fn online_rank(device: &Device) -> u8 {
    u8::from(device.foundness() == Foundness::Found)
}

impl AsRef<Device> for Device {
    fn as_ref(&self) -> &Device {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn device(id: &str, name: &str, foundness: &str, last_updated: Option<&str>) -> Device {
        serde_json::from_value(json!({
            "id": id,
            "device": {"id": id, "name": name, "hostname": format!("host-{}", id)},
            "status": {"foundness": foundness, "last_updated": last_updated}
        }))
        .unwrap()
    }

    fn fleet() -> Vec<Device> {
        vec![
            device("1", "Shibuya Entrance", "Found", Some("2024-05-01T10:00:00Z")),
            device("2", "Kirarina Floor 2", "Lost", Some("2024-04-01T10:00:00Z")),
            device("3", "shibuya backyard", "Found", None),
            device("4", "Umeda", "Unknown", Some("2024-06-01T10:00:00Z")),
        ]
    }

    fn ids(page: &FleetPage<Device>) -> Vec<&str> {
        page.items.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let query = FleetQuery {
            search: Some("SHIBUYA".into()),
            ..Default::default()
        };
        assert_eq!(ids(&query.apply(fleet())), vec!["1", "3"]);
    }

    #[test]
    fn test_status_filter() {
        let online = FleetQuery {
            status: StatusFilter::Online,
            ..Default::default()
        };
        assert_eq!(ids(&online.apply(fleet())).len(), 2);

        let offline = FleetQuery {
            status: StatusFilter::Offline,
            ..Default::default()
        };
        assert_eq!(ids(&offline.apply(fleet())), vec!["2"]);
    }

    #[test]
    fn test_sort_by_last_ping_desc() {
        let query = FleetQuery {
            sort: SortField::LastPing,
            order: SortOrder::Desc,
            ..Default::default()
        };
        assert_eq!(ids(&query.apply(fleet())), vec!["4", "1", "2", "3"]);
    }

    #[test]
    fn test_sort_by_status_keeps_name_order_stable() {
        let query = FleetQuery {
            sort: SortField::Status,
            order: SortOrder::Desc,
            ..Default::default()
        };
        assert_eq!(ids(&query.apply(fleet())), vec!["1", "3", "2", "4"]);
    }

    #[test]
    fn test_paging() {
        let query = FleetQuery {
            page: Some(2),
            per_page: Some(3),
            ..Default::default()
        };
        let page = query.apply(fleet());
        assert_eq!(page.total, 4);
        assert_eq!(page.pages, 2);
        assert_eq!(page.items.len(), 1);

        let past_end = FleetQuery {
            page: Some(9),
            per_page: Some(3),
            ..Default::default()
        };
        assert_eq!(past_end.apply(fleet()).page, 2);
    }

    #[test]
    fn test_query_from_camel_case() {
        let query: FleetQuery =
            serde_json::from_value(json!({"sort": "lastPing", "status": "offline"})).unwrap();
        assert_eq!(query.sort, SortField::LastPing);
        assert_eq!(query.status, StatusFilter::Offline);
    }
}
