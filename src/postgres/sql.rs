//! SQL statements against the pmdb telemetry views
//!
//! Statements are kept in sync with the external schema:
//!
//! - `pmdb.nc_view`: mountain node controller sensors, keyed by node location
//! - `pmdb.river_view`: river BMC sensors, keyed by controller location
//! - `pmdb.cc_view`: mountain chassis controller sensors (rectifier power)
//!
//! Bind parameters are uniform across node-scoped statements:
//! `$1` window start, `$2` window end, `$3` location array and, for river
//! energy, `$4` window length in seconds.

/// Width of the system power sampling bucket
pub const BUCKET_WIDTH: &str = "15s";

/// Mountain locations with energy counter rows in the window
pub const MOUNTAIN_LOCATIONS: &str = r#"
SELECT DISTINCT location
FROM pmdb.nc_view
WHERE physical_context = 'VoltageRegulator'
  AND parental_context = 'Chassis'
  AND physical_sub_context = 'Input'
  AND sensor_type = 'Energy'
  AND parental_index IS NULL
  AND device_specific_context IS NULL
  AND sub_index IS NULL
  AND timestamp BETWEEN $1 AND $2
  AND location = ANY($3)
"#;

/// River controller locations with any rows in the window
pub const RIVER_LOCATIONS: &str = r#"
SELECT DISTINCT location
FROM pmdb.river_view
WHERE timestamp BETWEEN $1 AND $2
  AND location = ANY($3)
"#;

/// Mountain energy per location: counter delta across the window
pub const MOUNTAIN_NODE_ENERGY: &str = r#"
SELECT location,
       (last(value, timestamp) - first(value, timestamp))::BIGINT AS energy
FROM pmdb.nc_view
WHERE physical_context = 'VoltageRegulator'
  AND parental_context = 'Chassis'
  AND physical_sub_context = 'Input'
  AND sensor_type = 'Energy'
  AND parental_index IS NULL
  AND device_specific_context IS NULL
  AND sub_index IS NULL
  AND timestamp BETWEEN $1 AND $2
  AND location = ANY($3)
GROUP BY location
"#;

/// River energy per controller: mean power integrated over the window
pub const RIVER_NODE_ENERGY: &str = r#"
SELECT location,
       (avg(value) * $4::DOUBLE PRECISION)::BIGINT AS energy
FROM pmdb.river_view
WHERE sensor_type = 'Power'
  AND physical_context IN ('Chassis', 'PowerSupplyBay', 'Intake')
  AND timestamp BETWEEN $1 AND $2
  AND location = ANY($3)
GROUP BY location
"#;

/// Mountain counter snapshot: latest value per sensor index, summed per location
pub const MOUNTAIN_NODE_ENERGY_COUNTER: &str = r#"
SELECT location,
       sum(v)::BIGINT AS counter,
       max(t)::TIMESTAMPTZ AS sample_time
FROM (
    SELECT location,
           index,
           last(value, timestamp) AS v,
           last(timestamp, timestamp) AS t
    FROM pmdb.nc_view
    WHERE physical_context = 'VoltageRegulator'
      AND parental_context = 'Chassis'
      AND physical_sub_context = 'Input'
      AND sensor_type = 'Energy'
      AND parental_index IS NULL
      AND device_specific_context IS NULL
      AND sub_index IS NULL
      AND timestamp BETWEEN $1 AND $2
      AND location = ANY($3)
    GROUP BY location, index
) per_index
GROUP BY location
ORDER BY location, sample_time
"#;

/// System power: per-bucket sum over both classes, then min/max/avg across buckets
pub const SYSTEM_POWER: &str = r#"
SELECT min(value)::BIGINT AS min,
       max(value)::BIGINT AS max,
       avg(value)::BIGINT AS avg
FROM (
    SELECT base.time AS time,
           sum(base.value) AS value
    FROM (
        SELECT time_bucket('15s', timestamp) AS time,
               location,
               index,
               avg(value) AS value
        FROM pmdb.cc_view
        WHERE physical_context = 'Rectifier'
          AND sensor_type = 'Power'
          AND physical_sub_context = 'Input'
          AND timestamp BETWEEN $1 AND $2
        GROUP BY time, location, index
        UNION ALL
        SELECT time_bucket('15s', timestamp) AS time,
               location,
               index,
               avg(value) AS value
        FROM pmdb.river_view
        WHERE physical_context IN ('Chassis', 'PowerSupplyBay', 'Intake')
          AND sensor_type = 'Power'
          AND timestamp BETWEEN $1 AND $2
        GROUP BY time, location, index
    ) base
    GROUP BY base.time
) buckets
"#;

/// System power per cabinet
///
/// River locations are cut to their cabinet prefix before bucketing so that
/// every controller in a cabinet is summed into the same bucket.
pub const SYSTEM_POWER_BY_CABINET: &str = r#"
SELECT min(value)::BIGINT AS min,
       max(value)::BIGINT AS max,
       avg(value)::DOUBLE PRECISION AS avg,
       split_part(location, 'c', 1) AS cabinet_id
FROM (
    SELECT base.time AS time,
           sum(base.value) AS value,
           location
    FROM (
        SELECT time_bucket('15s', timestamp) AS time,
               location,
               index,
               avg(value) AS value
        FROM pmdb.cc_view
        WHERE physical_context = 'Rectifier'
          AND sensor_type = 'Power'
          AND physical_sub_context = 'Input'
          AND timestamp BETWEEN $1 AND $2
        GROUP BY time, location, index
        UNION ALL
        SELECT time_bucket('15s', timestamp) AS time,
               split_part(location, 'c', 1) AS location,
               index,
               avg(value) AS value
        FROM pmdb.river_view
        WHERE physical_context IN ('Chassis', 'PowerSupplyBay', 'Intake')
          AND sensor_type = 'Power'
          AND timestamp BETWEEN $1 AND $2
        GROUP BY time, location, index
    ) base
    GROUP BY base.time, location
) buckets
GROUP BY split_part(location, 'c', 1)
ORDER BY cabinet_id
"#;
