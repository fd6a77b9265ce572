//! Neo4j-backed inventory store.
//!
//! Ranges are `(:Range {id})` nodes, hosts are `(:Host {address})` nodes
//! linked to their owning range by `BELONGS_TO`. Every trait method is a
//! single Cypher statement, which Neo4j executes as one transaction.
//!
//! Optional properties are stored as empty strings and timestamps as
//! fixed-width RFC 3339 UTC strings, so lexical comparison in Cypher matches
//! chronological order.

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use neo4rs::query;
use uuid::Uuid;

use ipam_core::error::Result as StoreResult;
use ipam_core::{
    AddressRange, CreateOutcome, Health, HostRecord, HostStatus, HostUpdate, InventoryStore,
    RangeId, ScanStatus,
};

use crate::client::{GraphClient, GraphError};

/// `InventoryStore` implementation on top of [`GraphClient`].
#[derive(Clone)]
pub struct GraphStore {
    client: GraphClient,
}

impl GraphStore {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &GraphClient {
        &self.client
    }

    /// Create or replace an address range's definition.
    ///
    /// Scan status and last scan time of an existing range are left alone.
    pub async fn upsert_range(&self, range: &AddressRange) -> Result<(), GraphError> {
        let q = query(
            "MERGE (r:Range {id: $id})
             ON CREATE SET
               r.name = $name, r.prefix = $prefix,
               r.scan_status = $scan_status, r.last_scan = $last_scan
             ON MATCH SET
               r.name = $name, r.prefix = $prefix",
        )
        .param("id", range.id.0.to_string())
        .param("name", range.name.clone())
        .param("prefix", range.prefix.to_string())
        .param("scan_status", range.scan_status.to_string())
        .param("last_scan", opt_ts(range.last_scan));

        self.client.run(q).await
    }

    /// Read every `(:Setting {key, value})` node as a map.
    pub async fn read_settings(&self) -> Result<HashMap<String, String>, GraphError> {
        let q = query("MATCH (s:Setting) RETURN s.key AS key, s.value AS value");
        let rows = self.client.query_rows(q).await?;

        let mut settings = HashMap::with_capacity(rows.len());
        for row in rows {
            let key: String = row
                .get("key")
                .map_err(|e| GraphError::Serialization(format!("Setting without key: {e}")))?;
            let value: String = row.get("value").unwrap_or_default();
            settings.insert(key, value);
        }
        Ok(settings)
    }

    /// Store one setting value.
    pub async fn write_setting(&self, key: &str, value: &str) -> Result<(), GraphError> {
        let q = query("MERGE (s:Setting {key: $key}) SET s.value = $value")
            .param("key", key.to_string())
            .param("value", value.to_string());
        self.client.run(q).await
    }

    async fn fetch_hosts(&self, q: neo4rs::Query) -> Result<Vec<HostRecord>, GraphError> {
        let rows = self.client.query_rows(q).await?;
        let mut hosts = Vec::with_capacity(rows.len());
        for row in rows {
            let node: neo4rs::Node = row.get("h").map_err(|e| {
                GraphError::Serialization(format!("Failed to deserialize host: {e}"))
            })?;
            hosts.push(node_to_host(&node)?);
        }
        Ok(hosts)
    }
}

#[async_trait]
impl InventoryStore for GraphStore {
    async fn list_ranges(&self) -> StoreResult<Vec<AddressRange>> {
        let q = query("MATCH (r:Range) RETURN r ORDER BY r.prefix");
        let rows = self.client.query_rows(q).await?;

        let mut ranges = Vec::with_capacity(rows.len());
        for row in rows {
            let node: neo4rs::Node = row.get("r").map_err(|e| {
                GraphError::Serialization(format!("Failed to deserialize range: {e}"))
            })?;
            ranges.push(node_to_range(&node)?);
        }
        Ok(ranges)
    }

    async fn get_range(&self, id: &RangeId) -> StoreResult<Option<AddressRange>> {
        let q = query("MATCH (r:Range {id: $id}) RETURN r").param("id", id.0.to_string());

        match self.client.query_one(q).await? {
            Some(row) => {
                let node: neo4rs::Node = row.get("r").map_err(|e| {
                    GraphError::Serialization(format!("Failed to deserialize range: {e}"))
                })?;
                Ok(Some(node_to_range(&node)?))
            }
            None => Ok(None),
        }
    }

    async fn list_hosts(&self) -> StoreResult<Vec<HostRecord>> {
        let q = query("MATCH (h:Host) RETURN h ORDER BY h.address");
        Ok(self.fetch_hosts(q).await?)
    }

    async fn list_hosts_in_range(&self, id: &RangeId) -> StoreResult<Vec<HostRecord>> {
        let q = query("MATCH (h:Host {range_id: $range_id}) RETURN h ORDER BY h.address")
            .param("range_id", id.0.to_string());
        Ok(self.fetch_hosts(q).await?)
    }

    async fn get_host(&self, address: IpAddr) -> StoreResult<Option<HostRecord>> {
        let q = query("MATCH (h:Host {address: $address}) RETURN h LIMIT 1")
            .param("address", address.to_string());
        Ok(self.fetch_hosts(q).await?.into_iter().next())
    }

    async fn create_host(&self, host: &HostRecord) -> StoreResult<CreateOutcome> {
        let q = query(
            "MERGE (h:Host {address: $address})
             ON CREATE SET
               h.hostname = $hostname, h.mac_address = $mac_address,
               h.status = $status, h.health = $health,
               h.last_seen = $last_seen, h.range_id = $range_id,
               h.created_by_merge = true
             WITH h, coalesce(h.created_by_merge, false) AS created
             REMOVE h.created_by_merge
             WITH h, created
             OPTIONAL MATCH (r:Range {id: $range_id})
             FOREACH (_ IN CASE WHEN created AND r IS NOT NULL THEN [1] ELSE [] END |
               MERGE (h)-[:BELONGS_TO]->(r))
             RETURN created",
        )
        .param("address", host.address.to_string())
        .param("hostname", opt_string(&host.hostname))
        .param("mac_address", opt_string(&host.mac_address))
        .param("status", host.status.as_str().to_string())
        .param("health", host.health.as_str().to_string())
        .param("last_seen", opt_ts(host.last_seen))
        .param("range_id", host.range_id.0.to_string());

        let created = match self.client.query_one(q).await? {
            Some(row) => row.get::<bool>("created").unwrap_or(false),
            None => false,
        };

        Ok(if created {
            CreateOutcome::Created
        } else {
            CreateOutcome::AlreadyExists
        })
    }

    async fn update_host(&self, address: IpAddr, update: &HostUpdate) -> StoreResult<()> {
        // Empty parameters mean "leave unchanged"; status is never written here.
        let q = query(
            "MATCH (h:Host {address: $address})
             SET h.last_seen = CASE
                   WHEN $last_seen = '' THEN h.last_seen
                   WHEN coalesce(h.last_seen, '') < $last_seen THEN $last_seen
                   ELSE h.last_seen END,
                 h.mac_address = CASE WHEN $mac_address = '' THEN h.mac_address
                   ELSE $mac_address END,
                 h.hostname = CASE WHEN $hostname = '' THEN h.hostname
                   ELSE $hostname END,
                 h.health = CASE WHEN $health = '' THEN h.health
                   ELSE $health END
             RETURN count(h) AS cnt",
        )
        .param("address", address.to_string())
        .param("last_seen", opt_ts(update.last_seen))
        .param("mac_address", opt_string(&update.mac_address))
        .param("hostname", opt_string(&update.hostname))
        .param(
            "health",
            update.health.map(|h| h.as_str().to_string()).unwrap_or_default(),
        );

        let matched = match self.client.query_one(q).await? {
            Some(row) => row.get::<i64>("cnt").unwrap_or(0),
            None => 0,
        };
        if matched == 0 {
            return Err(GraphError::NotFound {
                label: "Host".to_string(),
                key: "address".to_string(),
                value: address.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn set_scan_status(&self, id: &RangeId, status: &ScanStatus) -> StoreResult<()> {
        let q = query(
            "MATCH (r:Range {id: $id})
             SET r.scan_status = $scan_status
             RETURN count(r) AS cnt",
        )
        .param("id", id.0.to_string())
        .param("scan_status", status.to_string());

        self.expect_range(q, id).await
    }

    async fn complete_scan(&self, id: &RangeId, at: DateTime<Utc>) -> StoreResult<()> {
        let q = query(
            "MATCH (r:Range {id: $id})
             SET r.last_scan = $last_scan, r.scan_status = $scan_status
             RETURN count(r) AS cnt",
        )
        .param("id", id.0.to_string())
        .param("last_scan", ts(at))
        .param("scan_status", ScanStatus::Idle.to_string());

        self.expect_range(q, id).await
    }

    async fn purge_discovered(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let q = query(
            "MATCH (h:Host {status: $status})
             WHERE h.last_seen <> '' AND h.last_seen < $cutoff
             DETACH DELETE h
             RETURN count(h) AS cnt",
        )
        .param("status", HostStatus::Discovered.as_str().to_string())
        .param("cutoff", ts(cutoff));

        let deleted = match self.client.query_one(q).await? {
            Some(row) => row.get::<i64>("cnt").unwrap_or(0),
            None => 0,
        };
        Ok(deleted.max(0) as u64)
    }
}

impl GraphStore {
    async fn expect_range(&self, q: neo4rs::Query, id: &RangeId) -> StoreResult<()> {
        let matched = match self.client.query_one(q).await? {
            Some(row) => row.get::<i64>("cnt").unwrap_or(0),
            None => 0,
        };
        if matched == 0 {
            return Err(GraphError::NotFound {
                label: "Range".to_string(),
                key: "id".to_string(),
                value: id.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

// ── Conversions ──────────────────────────────────────────────────

fn node_to_range(node: &neo4rs::Node) -> Result<AddressRange, GraphError> {
    let id: String = required(node, "id")?;
    let prefix: String = required(node, "prefix")?;
    let status: String = node.get("scan_status").unwrap_or_default();
    let last_scan: String = node.get("last_scan").unwrap_or_default();

    Ok(AddressRange {
        id: RangeId(parse_uuid(&id)?),
        name: node.get("name").unwrap_or_default(),
        prefix: prefix
            .parse()
            .map_err(|e| GraphError::Serialization(format!("Bad prefix {prefix}: {e}")))?,
        scan_status: status
            .parse::<ScanStatus>()
            .map_err(|e| GraphError::Serialization(e.to_string()))?,
        last_scan: parse_opt_ts(&last_scan)?,
    })
}

fn node_to_host(node: &neo4rs::Node) -> Result<HostRecord, GraphError> {
    let address: String = required(node, "address")?;
    let status: String = required(node, "status")?;
    let range_id: String = node.get("range_id").unwrap_or_default();
    let health: String = node.get("health").unwrap_or_default();
    let last_seen: String = node.get("last_seen").unwrap_or_default();

    Ok(HostRecord {
        address: address
            .parse()
            .map_err(|e| GraphError::Serialization(format!("Bad address {address}: {e}")))?,
        hostname: non_empty(node.get("hostname").unwrap_or_default()),
        mac_address: non_empty(node.get("mac_address").unwrap_or_default()),
        status: status
            .parse::<HostStatus>()
            .map_err(|e| GraphError::Serialization(e.to_string()))?,
        health: health
            .parse::<Health>()
            .map_err(|e| GraphError::Serialization(e.to_string()))?,
        last_seen: parse_opt_ts(&last_seen)?,
        range_id: RangeId(parse_uuid(&range_id)?),
    })
}

fn required(node: &neo4rs::Node, key: &str) -> Result<String, GraphError> {
    node.get::<String>(key)
        .map_err(|e| GraphError::Serialization(format!("Missing property {key}: {e}")))
}

fn parse_uuid(raw: &str) -> Result<Uuid, GraphError> {
    Uuid::parse_str(raw).map_err(|e| GraphError::Serialization(format!("Bad id {raw}: {e}")))
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn opt_ts(at: Option<DateTime<Utc>>) -> String {
    at.map(ts).unwrap_or_default()
}

fn parse_opt_ts(raw: &str) -> Result<Option<DateTime<Utc>>, GraphError> {
    if raw.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(|e| GraphError::Serialization(format!("Bad timestamp {raw}: {e}")))
}

fn opt_string(opt: &Option<String>) -> String {
    opt.clone().unwrap_or_default()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn timestamps_sort_lexically() {
        let early = Utc::now();
        let late = early + TimeDelta::milliseconds(1500);
        assert!(ts(early) < ts(late));
        assert_eq!(ts(early).len(), ts(late).len());
    }

    #[test]
    fn timestamp_round_trip_keeps_micros() {
        let now = Utc::now();
        let parsed = parse_opt_ts(&ts(now)).unwrap().unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
        assert_eq!(parse_opt_ts("").unwrap(), None);
        assert!(parse_opt_ts("yesterday").is_err());
    }

    #[test]
    fn empty_strings_read_back_as_none() {
        assert_eq!(non_empty(String::new()), None);
        assert_eq!(non_empty("gw".to_string()), Some("gw".to_string()));
    }
}
