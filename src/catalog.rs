use crate::domain::DatasetDescriptor;
use crate::error::IngestError;

const LILA_BASE: &str = "https://storage.googleapis.com/public-datasets-lila";

pub const DATASETS: &[DatasetDescriptor] = &[
    DatasetDescriptor {
        id: "ena24",
        name: "ENA24-detection",
        description: "Camera trap images from Eastern North America, 23 classes with bounding boxes.",
        metadata_url: "https://storage.googleapis.com/public-datasets-lila/ena24/ena24.json",
        image_base_url: "https://storage.googleapis.com/public-datasets-lila/ena24/images/",
        is_archived: false,
        image_count: 8_789,
        category_count: 23,
    },
    DatasetDescriptor {
        id: "missouri-camera-traps",
        name: "Missouri Camera Traps",
        description: "Sequences from Missouri camera traps with bounding boxes on animals.",
        metadata_url: "https://storage.googleapis.com/public-datasets-lila/missouricameratraps/missouri_camera_traps_set1.json",
        image_base_url: "https://storage.googleapis.com/public-datasets-lila/missouricameratraps/images/",
        is_archived: false,
        image_count: 24_673,
        category_count: 20,
    },
    DatasetDescriptor {
        id: "orinoquia-camera-traps",
        name: "Orinoquía Camera Traps",
        description: "Camera trap images from the Colombian Orinoquía region.",
        metadata_url: "https://storage.googleapis.com/public-datasets-lila/orinoquia-camera-traps/orinoquia_camera_traps.json.zip",
        image_base_url: "https://storage.googleapis.com/public-datasets-lila/orinoquia-camera-traps/public/",
        is_archived: true,
        image_count: 104_782,
        category_count: 58,
    },
    DatasetDescriptor {
        id: "caltech-camera-traps",
        name: "Caltech Camera Traps",
        description: "Images from 140 camera locations in the American Southwest.",
        metadata_url: "https://storage.googleapis.com/public-datasets-lila/caltechcameratraps/labels/caltech_camera_traps.json.zip",
        image_base_url: "https://storage.googleapis.com/public-datasets-lila/caltech-unzipped/cct_images/",
        is_archived: true,
        image_count: 243_100,
        category_count: 21,
    },
    DatasetDescriptor {
        id: "channel-islands-camera-traps",
        name: "Channel Islands Camera Traps",
        description: "Camera trap images from the Channel Islands, California, with bounding boxes.",
        metadata_url: "https://storage.googleapis.com/public-datasets-lila/channel-islands-camera-traps/channel-islands-camera-traps.json.zip",
        image_base_url: "https://storage.googleapis.com/public-datasets-lila/channel-islands-camera-traps/images/",
        is_archived: true,
        image_count: 246_529,
        category_count: 6,
    },
    DatasetDescriptor {
        id: "wcs-camera-traps",
        name: "WCS Camera Traps",
        description: "Wildlife Conservation Society camera trap images from 12 countries.",
        metadata_url: "https://storage.googleapis.com/public-datasets-lila/wcscameratraps/wcs_camera_traps.json.zip",
        image_base_url: "https://storage.googleapis.com/public-datasets-lila/wcs-unzipped/",
        is_archived: true,
        image_count: 1_400_000,
        category_count: 675,
    },
    DatasetDescriptor {
        id: "idaho-camera-traps",
        name: "Idaho Camera Traps",
        description: "Images from the Idaho Department of Fish and Game camera trap program.",
        metadata_url: "https://storage.googleapis.com/public-datasets-lila/idaho-camera-traps/idaho_camera_traps.json.zip",
        image_base_url: "https://storage.googleapis.com/public-datasets-lila/idaho-camera-traps/public/",
        is_archived: true,
        image_count: 1_500_000,
        category_count: 62,
    },
    DatasetDescriptor {
        id: "nacti",
        name: "North American Camera Trap Images",
        description: "Camera trap images from five locations across the United States.",
        metadata_url: "https://storage.googleapis.com/public-datasets-lila/nacti/nacti_metadata.json.zip",
        image_base_url: "https://storage.googleapis.com/public-datasets-lila/nacti-unzipped/",
        is_archived: true,
        image_count: 3_700_000,
        category_count: 28,
    },
    DatasetDescriptor {
        id: "snapshot-serengeti",
        name: "Snapshot Serengeti",
        description: "Seasons 1-11 of the Snapshot Serengeti camera trap survey.",
        metadata_url: "https://storage.googleapis.com/public-datasets-lila/snapshotserengeti-v-2-0/SnapshotSerengeti_S1-11_v2.1.json.zip",
        image_base_url: "https://storage.googleapis.com/public-datasets-lila/snapshotserengeti-unzipped/",
        is_archived: true,
        image_count: 7_100_000,
        category_count: 61,
    },
];

pub fn all() -> &'static [DatasetDescriptor] {
    DATASETS
}

pub fn find(id: &str) -> Result<&'static DatasetDescriptor, IngestError> {
    let needle = id.trim();
    DATASETS
        .iter()
        .find(|descriptor| descriptor.id.eq_ignore_ascii_case(needle))
        .ok_or_else(|| IngestError::UnknownDataset(id.to_string()))
}

impl DatasetDescriptor {
    /// Last path segment of the metadata URL, used as the download file name.
    pub fn metadata_file_name(&self) -> String {
        let path = self
            .metadata_url
            .split(['?', '#'])
            .next()
            .unwrap_or(self.metadata_url);
        match path.rsplit('/').next() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("{}.json", self.id),
        }
    }

    pub fn is_lila_hosted(&self) -> bool {
        self.metadata_url.starts_with(LILA_BASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let mut ids = DATASETS.iter().map(|d| d.id).collect::<Vec<_>>();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), DATASETS.len());
    }

    #[test]
    fn archived_flag_matches_url() {
        for descriptor in DATASETS {
            assert_eq!(
                descriptor.is_archived,
                descriptor.metadata_url.ends_with(".zip"),
                "{}",
                descriptor.id
            );
            assert!(descriptor.is_lila_hosted());
            assert!(descriptor.image_base_url.ends_with('/'));
        }
    }
}
