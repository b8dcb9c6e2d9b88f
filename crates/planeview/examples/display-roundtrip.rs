//! Serve a small generated cube and fetch a quantized plane from it as a
//! display would.
//!
//! Run with: `cargo run -p planeview --example display-roundtrip`

use std::sync::Arc;

use planeview::channel::{connect, ChannelConfig, ChannelListener};
use planeview::frame::Value;
use planeview::image::{ChannelPlaneCache, CubeShape, ImageBackend, Plane, RawCube};
use planeview::transport::Endpoint;
use planeview::PlaneService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ramp.pv");
    let shape = CubeShape::new(8, 4, 1, 3);
    let mut cube = RawCube::create(&path, shape)?;
    for spectral in 0..shape.spectral {
        let pixels = (0..shape.plane_len())
            .map(|i| (i * (spectral + 1)) as f32)
            .collect();
        cube.put_plane([0, 0, 0, spectral], &Plane::new(shape.x, shape.y, pixels)?)?;
    }

    let service = PlaneService::new(Arc::new(ChannelPlaneCache::open(&path)?));
    let listener = ChannelListener::bind(&Endpoint::localhost(0)).await?;
    let endpoint = listener.endpoint().clone();
    println!("driver listening on {endpoint}");

    let driver = tokio::spawn(async move {
        let connection = listener
            .accept_with(|channel| service.register(channel))
            .await?;
        connection.channel().cancellation_token().cancelled().await;
        connection.join().await;
        Ok::<_, planeview::channel::ChannelError>(())
    });

    let display = connect(&endpoint, ChannelConfig::default().with_session("demo")).await?;
    let shape = display.channel().request("shape", Value::Null).await?;
    println!("shape: {shape:?}");

    let reply = display
        .channel()
        .request(
            "plane",
            Value::map([
                ("index", Value::from(vec![0, 2])),
                (
                    "quantize",
                    Value::map([
                        ("bits", Value::from(8)),
                        ("transfer", Value::from("sqrt")),
                    ]),
                ),
            ]),
        )
        .await?;
    if let Some(pixels) = reply.get("pixels").and_then(Value::as_array) {
        println!("levels {:?}: {:?}", pixels.shape(), pixels.data().as_ref());
    }

    display.close("demo finished");
    display.join().await;
    driver.await??;
    Ok(())
}
