//! Serves planes from a [`ChannelPlaneCache`] to a display.
//!
//! Registered correlation ids and their messages:
//!
//! | id | request | reply |
//! |---|---|---|
//! | `shape` | any | `{x, y, stokes, spectral}` |
//! | `plane` | `{index: [stokes, spectral], pixel_type?, quantize?: {bits, bounds, transfer, args}}` | `{index, pixels}` |
//! | `statistics` | `{index}` | `{npts, min, max, sum, sumsq, mean, rms, sigma}` |
//! | `mask` | `{index}` | `{index, pixels}` or `null` without a mask |

use std::sync::Arc;

use planeview_channel::{CorrelatedChannel, HandlerResult, FAULT_BAD_REQUEST, FAULT_HANDLER_FAILED};
use planeview_frame::{Fault, Value};
use planeview_image::{
    quantize, BackendError, ChannelPlaneCache, CubeShape, PixelType, PixelWidth, PlaneIndex,
    Statistics, Transfer,
};
use tracing::debug;

pub const SHAPE_ID: &str = "shape";
pub const PLANE_ID: &str = "plane";
pub const STATISTICS_ID: &str = "statistics";
pub const MASK_ID: &str = "mask";

/// Answers display requests from a shared plane cache.
#[derive(Debug, Clone)]
pub struct PlaneService {
    cache: Arc<ChannelPlaneCache>,
}

impl PlaneService {
    pub fn new(cache: Arc<ChannelPlaneCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<ChannelPlaneCache> {
        &self.cache
    }

    /// Register this service's handlers on `channel`.
    pub fn register(&self, channel: &CorrelatedChannel) {
        let shape = self.cache.shape();
        channel.register(SHAPE_ID, move |_| async move { Ok(shape_value(shape)) });

        let cache = Arc::clone(&self.cache);
        channel.register(PLANE_ID, move |message| {
            let cache = Arc::clone(&cache);
            blocking(move || plane_reply(&cache, &message))
        });

        let cache = Arc::clone(&self.cache);
        channel.register(STATISTICS_ID, move |message| {
            let cache = Arc::clone(&cache);
            blocking(move || {
                let index = parse_index(&message)?;
                let stats = cache.statistics(index).map_err(backend_fault)?;
                Ok(statistics_value(&stats))
            })
        });

        let cache = Arc::clone(&self.cache);
        channel.register(MASK_ID, move |message| {
            let cache = Arc::clone(&cache);
            blocking(move || {
                let index = parse_index(&message)?;
                let Some(mask) = cache.mask(index).map_err(backend_fault)? else {
                    return Ok(Value::Null);
                };
                let pixels = mask.to_array().map_err(backend_fault)?;
                Ok(Value::map([
                    ("index", index_value(cache.shape(), index)),
                    ("pixels", Value::Array(pixels)),
                ]))
            })
        });

        debug!(
            ids = ?[SHAPE_ID, PLANE_ID, STATISTICS_ID, MASK_ID],
            "plane service registered"
        );
    }
}

/// Run cache I/O off the runtime's worker threads.
async fn blocking<F>(work: F) -> HandlerResult
where
    F: FnOnce() -> HandlerResult + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .unwrap_or_else(|err| Err(Fault::new(FAULT_HANDLER_FAILED, err.to_string())))
}

fn plane_reply(cache: &ChannelPlaneCache, message: &Value) -> HandlerResult {
    let index = parse_index(message)?;
    let plane = cache.plane(index).map_err(backend_fault)?;

    let pixels = match message.get("quantize") {
        Some(spec) if !spec.is_null() => {
            let (width, bounds, transfer) = parse_quantize(spec)?;
            quantize(&plane, width, bounds, transfer)
                .to_array()
                .map_err(backend_fault)?
        }
        _ => {
            let pixel_type = match message.get("pixel_type").and_then(Value::as_str) {
                Some(name) => PixelType::from_name(name).ok_or_else(|| {
                    bad_request(format!("unsupported pixel_type '{name}'"))
                })?,
                None => PixelType::default(),
            };
            plane.to_array(pixel_type).map_err(backend_fault)?
        }
    };

    Ok(Value::map([
        ("index", index_value(cache.shape(), index)),
        ("pixels", Value::Array(pixels)),
    ]))
}

fn parse_index(message: &Value) -> Result<PlaneIndex, Fault> {
    let Some(index) = message.get("index") else {
        return Ok((0, 0));
    };
    match index.as_seq() {
        Some([stokes, spectral]) => match (stokes.as_i64(), spectral.as_i64()) {
            (Some(stokes), Some(spectral)) => Ok((stokes, spectral)),
            _ => Err(bad_request("index components must be integers")),
        },
        _ => Err(bad_request("index must be [stokes, spectral]")),
    }
}

fn parse_quantize(spec: &Value) -> Result<(PixelWidth, (f64, f64), Transfer), Fault> {
    let bits = spec.get("bits").and_then(Value::as_i64).unwrap_or(8);
    let width = u32::try_from(bits)
        .ok()
        .and_then(|bits| PixelWidth::from_bits(bits).ok())
        .ok_or_else(|| bad_request(format!("unsupported pixel width {bits}")))?;

    let bound = |v: &Value| v.as_f64().unwrap_or(f64::NAN);
    let bounds = match spec.get("bounds").and_then(Value::as_seq) {
        Some([lo, hi]) => (bound(lo), bound(hi)),
        Some(_) => return Err(bad_request("bounds must be [low, high]")),
        None => (f64::NAN, f64::NAN),
    };

    let args: Vec<f64> = spec
        .get("args")
        .and_then(Value::as_seq)
        .map(|args| args.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();
    let transfer = spec
        .get("transfer")
        .and_then(Value::as_str)
        .map_or(Transfer::Linear, |name| Transfer::from_name_lenient(name, &args));

    Ok((width, bounds, transfer))
}

fn shape_value(shape: CubeShape) -> Value {
    Value::map([
        ("x", shape.x),
        ("y", shape.y),
        ("stokes", shape.stokes),
        ("spectral", shape.spectral),
    ])
}

fn index_value(shape: CubeShape, index: PlaneIndex) -> Value {
    let (stokes, spectral) = shape.clamp(index);
    Value::from(vec![stokes, spectral])
}

fn statistics_value(stats: &Statistics) -> Value {
    Value::map([
        ("npts", Value::from(stats.npts)),
        ("min", Value::from(stats.min)),
        ("max", Value::from(stats.max)),
        ("sum", Value::from(stats.sum)),
        ("sumsq", Value::from(stats.sumsq)),
        ("mean", Value::from(stats.mean)),
        ("rms", Value::from(stats.rms)),
        ("sigma", Value::from(stats.sigma)),
    ])
}

fn bad_request(message: impl Into<String>) -> Fault {
    Fault::new(FAULT_BAD_REQUEST, message)
}

fn backend_fault(err: BackendError) -> Fault {
    Fault::new(FAULT_HANDLER_FAILED, err.to_string())
}
