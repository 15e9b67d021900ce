//! Index schemas.
//!
//! | Index | Prefix | Key | Value |
//! |-------|--------|-----|-------|
//! | [`RetrievalDataIndex`] | `0x01` | address | store timestamp, payload |
//! | [`RetrievalAccessIndex`] | `0x02` | address | access timestamp |
//! | [`RetrievalCompositeIndex`] | `0x03` | address | both timestamps, payload |
//! | [`PullIndex`] | `0x04` | store timestamp, address | - |
//! | [`PushIndex`] | `0x05` | store timestamp, address | - |
//! | [`GcIndex`] | `0x06` | access timestamp, address | - |
//! | [`TimestampIndex`] | `0x07` | address | store timestamp, access timestamp |
//!
//! Prefix `0x00` is reserved for store metadata such as the GC size.
//! Integers in keys are big-endian so iteration follows numeric order.

use serde::{Deserialize, Serialize};
use vertex_storage::{DatabaseError, Decode, Encode};

use crate::{ChunkAddress, ChunkItem, IndexSchema};

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, DatabaseError> {
    postcard::to_allocvec(value).map_err(|err| DatabaseError::Other(err.to_string()))
}

fn decode_value<'a, T: Deserialize<'a>>(value: &'a [u8]) -> Result<T, DatabaseError> {
    postcard::from_bytes(value).map_err(|_| DatabaseError::Decode)
}

fn decode_address_key(key: &[u8]) -> Result<ChunkItem, DatabaseError> {
    Ok(ChunkItem::new(ChunkAddress::decode(key)?))
}

fn timestamp_address_key(timestamp: u64, address: ChunkAddress) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + ChunkAddress::LENGTH);
    key.extend_from_slice(&timestamp.encode());
    key.extend_from_slice(&address.encode());
    key
}

fn decode_timestamp_address_key(key: &[u8]) -> Result<(u64, ChunkAddress), DatabaseError> {
    let (timestamp, address) = key.split_at_checked(8).ok_or(DatabaseError::Decode)?;
    Ok((u64::decode(timestamp)?, ChunkAddress::decode(address)?))
}

#[derive(Serialize)]
struct DataValueRef<'a> {
    store_timestamp: u64,
    data: &'a [u8],
}

#[derive(Deserialize)]
struct DataValue {
    store_timestamp: u64,
    data: Vec<u8>,
}

#[derive(Serialize)]
struct CompositeValueRef<'a> {
    store_timestamp: u64,
    access_timestamp: u64,
    data: &'a [u8],
}

#[derive(Deserialize)]
struct CompositeValue {
    store_timestamp: u64,
    access_timestamp: u64,
    data: Vec<u8>,
}

/// Chunk payload and store timestamp, keyed by address (split layout).
#[derive(Debug, Clone, Copy)]
pub struct RetrievalDataIndex;

impl IndexSchema for RetrievalDataIndex {
    const NAME: &'static str = "retrieval-data";
    const PREFIX: u8 = 0x01;

    fn encode_key(item: &ChunkItem) -> Vec<u8> {
        item.address.encode().to_vec()
    }

    fn decode_key(key: &[u8]) -> Result<ChunkItem, DatabaseError> {
        decode_address_key(key)
    }

    fn encode_value(item: &ChunkItem) -> Result<Vec<u8>, DatabaseError> {
        encode_value(&DataValueRef {
            store_timestamp: item.store_timestamp,
            data: &item.data,
        })
    }

    fn decode_value(keys: ChunkItem, value: &[u8]) -> Result<ChunkItem, DatabaseError> {
        let value: DataValue = decode_value(value)?;
        Ok(keys
            .with_store_timestamp(value.store_timestamp)
            .with_data(value.data))
    }
}

/// Access timestamp keyed by address (split layout).
#[derive(Debug, Clone, Copy)]
pub struct RetrievalAccessIndex;

impl IndexSchema for RetrievalAccessIndex {
    const NAME: &'static str = "retrieval-access";
    const PREFIX: u8 = 0x02;

    fn encode_key(item: &ChunkItem) -> Vec<u8> {
        item.address.encode().to_vec()
    }

    fn decode_key(key: &[u8]) -> Result<ChunkItem, DatabaseError> {
        decode_address_key(key)
    }

    fn encode_value(item: &ChunkItem) -> Result<Vec<u8>, DatabaseError> {
        Ok(item.access_timestamp.encode().to_vec())
    }

    fn decode_value(keys: ChunkItem, value: &[u8]) -> Result<ChunkItem, DatabaseError> {
        Ok(keys.with_access_timestamp(u64::decode(value)?))
    }
}

/// Payload and both timestamps keyed by address (composite layout).
#[derive(Debug, Clone, Copy)]
pub struct RetrievalCompositeIndex;

impl IndexSchema for RetrievalCompositeIndex {
    const NAME: &'static str = "retrieval-composite";
    const PREFIX: u8 = 0x03;

    fn encode_key(item: &ChunkItem) -> Vec<u8> {
        item.address.encode().to_vec()
    }

    fn decode_key(key: &[u8]) -> Result<ChunkItem, DatabaseError> {
        decode_address_key(key)
    }

    fn encode_value(item: &ChunkItem) -> Result<Vec<u8>, DatabaseError> {
        encode_value(&CompositeValueRef {
            store_timestamp: item.store_timestamp,
            access_timestamp: item.access_timestamp,
            data: &item.data,
        })
    }

    fn decode_value(keys: ChunkItem, value: &[u8]) -> Result<ChunkItem, DatabaseError> {
        let value: CompositeValue = decode_value(value)?;
        Ok(keys
            .with_store_timestamp(value.store_timestamp)
            .with_access_timestamp(value.access_timestamp)
            .with_data(value.data))
    }
}

/// Chunks available to be pulled by peers, ordered by store time.
#[derive(Debug, Clone, Copy)]
pub struct PullIndex;

impl IndexSchema for PullIndex {
    const NAME: &'static str = "pull";
    const PREFIX: u8 = 0x04;

    fn encode_key(item: &ChunkItem) -> Vec<u8> {
        timestamp_address_key(item.store_timestamp, item.address)
    }

    fn decode_key(key: &[u8]) -> Result<ChunkItem, DatabaseError> {
        let (store_timestamp, address) = decode_timestamp_address_key(key)?;
        Ok(ChunkItem::new(address).with_store_timestamp(store_timestamp))
    }

    fn encode_value(_item: &ChunkItem) -> Result<Vec<u8>, DatabaseError> {
        Ok(Vec::new())
    }

    fn decode_value(keys: ChunkItem, _value: &[u8]) -> Result<ChunkItem, DatabaseError> {
        Ok(keys)
    }
}

/// Chunks stored locally but not yet confirmed synced, ordered by store time.
#[derive(Debug, Clone, Copy)]
pub struct PushIndex;

impl IndexSchema for PushIndex {
    const NAME: &'static str = "push";
    const PREFIX: u8 = 0x05;

    fn encode_key(item: &ChunkItem) -> Vec<u8> {
        timestamp_address_key(item.store_timestamp, item.address)
    }

    fn decode_key(key: &[u8]) -> Result<ChunkItem, DatabaseError> {
        let (store_timestamp, address) = decode_timestamp_address_key(key)?;
        Ok(ChunkItem::new(address).with_store_timestamp(store_timestamp))
    }

    fn encode_value(_item: &ChunkItem) -> Result<Vec<u8>, DatabaseError> {
        Ok(Vec::new())
    }

    fn decode_value(keys: ChunkItem, _value: &[u8]) -> Result<ChunkItem, DatabaseError> {
        Ok(keys)
    }
}

/// Eviction candidates, least recently accessed first.
#[derive(Debug, Clone, Copy)]
pub struct GcIndex;

impl IndexSchema for GcIndex {
    const NAME: &'static str = "gc";
    const PREFIX: u8 = 0x06;

    fn encode_key(item: &ChunkItem) -> Vec<u8> {
        timestamp_address_key(item.access_timestamp, item.address)
    }

    fn decode_key(key: &[u8]) -> Result<ChunkItem, DatabaseError> {
        let (access_timestamp, address) = decode_timestamp_address_key(key)?;
        Ok(ChunkItem::new(address).with_access_timestamp(access_timestamp))
    }

    fn encode_value(_item: &ChunkItem) -> Result<Vec<u8>, DatabaseError> {
        Ok(Vec::new())
    }

    fn decode_value(keys: ChunkItem, _value: &[u8]) -> Result<ChunkItem, DatabaseError> {
        Ok(keys)
    }
}

/// Both timestamps keyed by address, for every chunk with pull or push
/// entries, whether stored or only accessed.
///
/// Pull and push keys lead with the store timestamp; this index lets them be
/// rebuilt from the address alone when no canonical record exists.
#[derive(Debug, Clone, Copy)]
pub struct TimestampIndex;

impl IndexSchema for TimestampIndex {
    const NAME: &'static str = "timestamps";
    const PREFIX: u8 = 0x07;

    fn encode_key(item: &ChunkItem) -> Vec<u8> {
        item.address.encode().to_vec()
    }

    fn decode_key(key: &[u8]) -> Result<ChunkItem, DatabaseError> {
        decode_address_key(key)
    }

    fn encode_value(item: &ChunkItem) -> Result<Vec<u8>, DatabaseError> {
        let mut value = Vec::with_capacity(16);
        value.extend_from_slice(&item.store_timestamp.encode());
        value.extend_from_slice(&item.access_timestamp.encode());
        Ok(value)
    }

    fn decode_value(keys: ChunkItem, value: &[u8]) -> Result<ChunkItem, DatabaseError> {
        let (store, access) = value.split_at_checked(8).ok_or(DatabaseError::Decode)?;
        Ok(keys
            .with_store_timestamp(u64::decode(store)?)
            .with_access_timestamp(u64::decode(access)?))
    }
}
