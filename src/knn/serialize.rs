/*!
# Classifier Serialization

Binary on-disk format for a trained [`Classifier`], version 2. All scalars
are stored in native endianness (the files are host-produced and host-read).
Layout:

```text
u32 version (= 2)
u32 num_k
u32 num_features
u32 num_feature_vectors
u32 num_feature_names
per feature name:       u32 length (incl. NUL), bytes, NUL-terminated
per feature vector:     u32 length (incl. NUL), bytes, NUL-terminated  (id name)
u8  normalize flag
if flag: f64[num_features] norm vector, f64[num_features] stdev vector
i32[num_features] selection (0 / 1)
f64[num_features] weights
f64[num_feature_vectors * num_features] normalized feature matrix
```

The norm statistics are stored as *two* arrays even though the runtime
folds mean and scale into the single norm vector; the second array carries
the clamped standard deviations. Any structural mismatch aborts with
[`KnnError::Format`]; short reads surface as [`KnnError::Io`]. There is no
partial recovery.
*/

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{KnnError, KnnResult};
use crate::knn::classifier::Classifier;
use crate::knn::distance::DistanceKind;
use crate::knn::engine::ConfidenceKind;
use crate::knn::normalize::Normalize;

const FORMAT_VERSION: u32 = 2;

fn write_u32<W: Write>(writer: &mut W, value: u32) -> KnnResult<()> {
    writer.write_all(&value.to_ne_bytes())?;
    Ok(())
}

fn write_i32<W: Write>(writer: &mut W, value: i32) -> KnnResult<()> {
    writer.write_all(&value.to_ne_bytes())?;
    Ok(())
}

fn write_f64<W: Write>(writer: &mut W, value: f64) -> KnnResult<()> {
    writer.write_all(&value.to_ne_bytes())?;
    Ok(())
}

fn write_string<W: Write>(writer: &mut W, value: &str) -> KnnResult<()> {
    let bytes = value.as_bytes();
    write_u32(writer, (bytes.len() + 1) as u32)?;
    writer.write_all(bytes)?;
    writer.write_all(&[0])?;
    Ok(())
}

fn read_u32<R: Read>(reader: &mut R) -> KnnResult<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_ne_bytes(buf))
}

fn read_i32<R: Read>(reader: &mut R) -> KnnResult<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_ne_bytes(buf))
}

fn read_f64<R: Read>(reader: &mut R) -> KnnResult<f64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_ne_bytes(buf))
}

fn read_f64_vec<R: Read>(reader: &mut R, len: usize) -> KnnResult<Vec<f64>> {
    (0..len).map(|_| read_f64(reader)).collect()
}

fn read_string<R: Read>(reader: &mut R) -> KnnResult<String> {
    let len = read_u32(reader)? as usize;
    if len == 0 {
        return Err(KnnError::Format("zero-length string".to_string()));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    if buf.pop() != Some(0) {
        return Err(KnnError::Format("string is not NUL-terminated".to_string()));
    }
    String::from_utf8(buf).map_err(|_| KnnError::Format("string is not valid UTF-8".to_string()))
}

impl Classifier {
    /// Writes the trained classifier in the version-2 binary format.
    ///
    /// # Errors
    /// [`KnnError::NotTrained`] without training data, [`KnnError::Io`] on
    /// write failures.
    pub fn serialize<W: Write>(&self, writer: &mut W) -> KnnResult<()> {
        if self.id_names.is_empty() {
            return Err(KnnError::NotTrained);
        }

        write_u32(writer, FORMAT_VERSION)?;
        write_u32(writer, self.num_k as u32)?;
        write_u32(writer, self.num_features as u32)?;
        write_u32(writer, self.id_names.len() as u32)?;
        write_u32(writer, self.feature_names.len() as u32)?;

        for name in &self.feature_names {
            write_string(writer, name)?;
        }
        for id in &self.id_names {
            write_string(writer, id)?;
        }

        match &self.normalize {
            Some(norm) => {
                writer.write_all(&[1])?;
                for &value in norm.norm_vector()? {
                    write_f64(writer, value)?;
                }
                for &value in norm.stdev_vector()? {
                    write_f64(writer, value)?;
                }
            }
            None => writer.write_all(&[0])?,
        }

        for &selected in &self.selection {
            write_i32(writer, i32::from(selected))?;
        }
        for &weight in &self.weights {
            write_f64(writer, weight)?;
        }
        for &value in &self.feature_vectors {
            write_f64(writer, value)?;
        }
        Ok(())
    }

    /// Reads a classifier back from the version-2 binary format. The
    /// distance metric and confidence kinds are not part of the format
    /// and come back as their defaults.
    ///
    /// # Errors
    /// [`KnnError::UnsupportedVersion`] on an unknown version,
    /// [`KnnError::Format`] on structural errors, [`KnnError::Io`] on
    /// short reads.
    pub fn unserialize<R: Read>(reader: &mut R) -> KnnResult<Self> {
        let version = read_u32(reader)?;
        if version != FORMAT_VERSION {
            return Err(KnnError::UnsupportedVersion(version));
        }
        let num_k = read_u32(reader)? as usize;
        let num_features = read_u32(reader)? as usize;
        let num_vectors = read_u32(reader)? as usize;
        let num_names = read_u32(reader)? as usize;
        if num_names != num_features {
            return Err(KnnError::Format(format!(
                "{num_names} feature names for {num_features} features"
            )));
        }

        let feature_names = (0..num_names)
            .map(|_| read_string(reader))
            .collect::<KnnResult<Vec<_>>>()?;
        let id_names = (0..num_vectors)
            .map(|_| read_string(reader))
            .collect::<KnnResult<Vec<_>>>()?;

        let mut flag = [0u8; 1];
        reader.read_exact(&mut flag)?;
        let normalize = match flag[0] {
            0 => None,
            1 => {
                let norm = read_f64_vec(reader, num_features)?;
                let stdev = read_f64_vec(reader, num_features)?;
                Some(Normalize::from_stored_vectors(norm, stdev)?)
            }
            other => {
                return Err(KnnError::Format(format!("invalid normalize flag {other}")));
            }
        };

        let selection = (0..num_features)
            .map(|_| read_i32(reader).map(|v| v != 0))
            .collect::<KnnResult<Vec<_>>>()?;
        let weights = read_f64_vec(reader, num_features)?;
        let feature_vectors = read_f64_vec(reader, num_vectors * num_features)?;

        Ok(Classifier {
            num_features,
            feature_names,
            id_names,
            feature_vectors,
            selection,
            weights,
            normalize,
            num_k: num_k.max(1),
            distance_kind: DistanceKind::default(),
            confidence_kinds: vec![ConfidenceKind::Default],
        })
    }

    /// Serializes to a file, buffered.
    pub fn serialize_file<P: AsRef<Path>>(&self, path: P) -> KnnResult<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.serialize(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Unserializes from a file, buffered.
    pub fn unserialize_file<P: AsRef<Path>>(path: P) -> KnnResult<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::unserialize(&mut reader)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn sample_classifier() -> Classifier {
        let samples = vec![
            ("a".to_string(), vec![1.0, 2.0, 3.0]),
            ("b".to_string(), vec![4.0, 5.0, 6.0]),
            ("a".to_string(), vec![1.5, 2.5, 3.5]),
        ];
        let names = vec!["f0".to_string(), "f1".to_string(), "f2".to_string()];
        let mut classifier = Classifier::from_samples(names, samples).unwrap();
        classifier.set_num_k(3);
        classifier
            .set_selection_vector(vec![true, false, true])
            .unwrap();
        classifier
            .set_weight_vector(vec![0.5, 1.0, 2.0])
            .unwrap();
        classifier
    }

    #[test]
    fn round_trip_is_bit_for_bit() {
        let original = sample_classifier();
        let mut buffer = Vec::new();
        original.serialize(&mut buffer).unwrap();
        let restored = Classifier::unserialize(&mut Cursor::new(&buffer)).unwrap();

        assert_eq!(restored.num_k(), original.num_k());
        assert_eq!(restored.num_features(), original.num_features());
        assert_eq!(restored.feature_names(), original.feature_names());
        assert_eq!(restored.id_names(), original.id_names());
        assert_eq!(restored.selection_vector(), original.selection_vector());
        assert_eq!(restored.weight_vector(), original.weight_vector());
        assert_eq!(restored.feature_vectors, original.feature_vectors);

        let orig_norm = original.normalize.as_ref().unwrap();
        let rest_norm = restored.normalize.as_ref().unwrap();
        assert_eq!(
            orig_norm.norm_vector().unwrap(),
            rest_norm.norm_vector().unwrap()
        );
        assert_eq!(
            orig_norm.stdev_vector().unwrap(),
            rest_norm.stdev_vector().unwrap()
        );
    }

    #[test]
    fn restored_classifier_classifies_identically() {
        let original = sample_classifier();
        let mut buffer = Vec::new();
        original.serialize(&mut buffer).unwrap();
        let restored = Classifier::unserialize(&mut Cursor::new(&buffer)).unwrap();

        let unknown = [1.2, 2.2, 3.2];
        let a = original.classify(&unknown).unwrap();
        let b = restored.classify(&unknown).unwrap();
        assert_eq!(a.answers, b.answers);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classifier.knn");
        let original = sample_classifier();
        original.serialize_file(&path).unwrap();
        let restored = Classifier::unserialize_file(&path).unwrap();
        assert_eq!(restored.feature_vectors, original.feature_vectors);
        assert_eq!(restored.num_k(), 3);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&7u32.to_ne_bytes());
        let result = Classifier::unserialize(&mut Cursor::new(&buffer));
        assert!(matches!(result, Err(KnnError::UnsupportedVersion(7))));
    }

    #[test]
    fn truncated_input_is_an_io_error() {
        let original = sample_classifier();
        let mut buffer = Vec::new();
        original.serialize(&mut buffer).unwrap();
        buffer.truncate(buffer.len() / 2);
        let result = Classifier::unserialize(&mut Cursor::new(&buffer));
        assert!(matches!(result, Err(KnnError::Io(_))));
    }

    #[test]
    fn bad_normalize_flag_is_a_format_error() {
        // minimal valid prefix followed by an invalid flag byte
        let mut bad = Vec::new();
        bad.extend_from_slice(&FORMAT_VERSION.to_ne_bytes());
        bad.extend_from_slice(&1u32.to_ne_bytes()); // num_k
        bad.extend_from_slice(&1u32.to_ne_bytes()); // num_features
        bad.extend_from_slice(&0u32.to_ne_bytes()); // num_vectors
        bad.extend_from_slice(&1u32.to_ne_bytes()); // num_names
        bad.extend_from_slice(&2u32.to_ne_bytes()); // name "x\0"
        bad.extend_from_slice(b"x\0");
        bad.push(9); // invalid flag
        let result = Classifier::unserialize(&mut Cursor::new(&bad));
        assert!(matches!(result, Err(KnnError::Format(_))));
    }
}
