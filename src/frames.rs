use crate::types::Frame;
use image::ImageFormat;
use log::{debug, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Lists the sampled frames written by the extractor (`0.jpg`, `1.jpg`, ...),
/// ordered by frame number. Files that are not JPEG or PNG images are ignored.
/// Frame contents are not read here.
pub fn load_frames(dir: &Path) -> io::Result<Vec<Frame>> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        match ImageFormat::from_path(&path) {
            Ok(ImageFormat::Jpeg) | Ok(ImageFormat::Png) => paths.push(path),
            _ => debug!("Ignoring non-frame file {:?}", path),
        }
    }
    paths.sort_by_key(|path| sort_key(path));

    let frames: Vec<Frame> = paths
        .into_iter()
        .enumerate()
        .map(|(index, path)| Frame {
            index,
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path,
        })
        .collect();
    info!("Found {} frames in {:?}", frames.len(), dir);
    Ok(frames)
}

// Numbered frames first, in numeric order; anything else after, by name.
fn sort_key(path: &Path) -> (bool, u64, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match stem.parse::<u64>() {
        Ok(number) => (false, number, stem),
        Err(_) => (true, 0, stem),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_ordered_numerically_and_non_images_skipped() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["10.jpg", "2.jpg", "0.jpg", "1.JPG", "extra.png", "notes.txt"] {
            fs::write(dir.path().join(name), name.as_bytes()).unwrap();
        }
        fs::create_dir(dir.path().join("nested.jpg")).unwrap();

        let frames = load_frames(dir.path()).unwrap();
        let names: Vec<&str> = frames.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["0.jpg", "1.JPG", "2.jpg", "10.jpg", "extra.png"]);
        let indices: Vec<usize> = frames.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(frames[3].path, dir.path().join("10.jpg"));
    }

    #[tokio::test]
    async fn frame_contents_are_read_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0.jpg"), b"first").unwrap();
        let frames = load_frames(dir.path()).unwrap();

        fs::write(dir.path().join("0.jpg"), b"rewritten").unwrap();
        assert_eq!(&frames[0].read().await.unwrap()[..], b"rewritten");

        fs::remove_file(dir.path().join("0.jpg")).unwrap();
        assert!(frames[0].read().await.is_err());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_frames(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn empty_directory_yields_no_frames() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_frames(dir.path()).unwrap().is_empty());
    }
}
