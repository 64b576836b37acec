#[cfg(feature = "indicatif")]
use indicatif::{ProgressBar, ProgressStyle};

#[cfg(feature = "indicatif")]
fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {percent} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// Progress bar over a tile loop, a no-op without the `indicatif` feature
pub struct TileProgress {
    #[cfg(feature = "indicatif")]
    bar: Option<ProgressBar>,
}

impl TileProgress {
    pub fn new(len: usize, message: &'static str) -> Self {
        #[cfg(feature = "indicatif")]
        {
            let bar = (len > 0).then(|| {
                let pb = ProgressBar::new(len as u64);
                pb.set_style(progress_style());
                pb.set_message(message);
                pb.tick();
                pb
            });
            TileProgress { bar }
        }

        #[cfg(not(feature = "indicatif"))]
        {
            let _ = (len, message);
            TileProgress {}
        }
    }

    pub fn inc(&self) {
        #[cfg(feature = "indicatif")]
        if let Some(ref pb) = self.bar {
            pb.inc(1);
        }
    }

    pub fn finish(&self, message: &'static str) {
        #[cfg(feature = "indicatif")]
        if let Some(ref pb) = self.bar {
            pb.finish_with_message(message);
        }
        #[cfg(not(feature = "indicatif"))]
        let _ = message;
    }
}
