pub mod agencies;
pub mod arrivals;
pub mod config;
pub mod emergency;
pub mod fetch;
pub mod http;
pub mod realtime;
pub mod schedule;
pub mod store;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
