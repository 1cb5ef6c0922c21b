//! Per-sample analysis: expression quantification for every sample, plus
//! region events and read clusters for crosslinking samples.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use tracing::info;
use tracing::warn;

use super::required;
use super::Pipeline;
use crate::cache;
use crate::layout::ensure_dir;
use crate::quantification;
use crate::sample::Sample;
use crate::sample::SampleType;
use crate::utils::command::CommandLine;
use crate::utils::command::Invocation;
use crate::utils::pathbuf::bam_stem;

/// An annotated-region file and the label derived from its name.
#[derive(Clone, Debug, Eq, PartialEq)]
struct Region {
    label: String,
    path: PathBuf,
}

/// Lists the `*.gff` and `*.gff3` files of `dir`, sorted by file name.
fn region_files(dir: &Path) -> anyhow::Result<Vec<Region>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("listing region files in {}", dir.display()))?;

    let mut regions = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_region = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("gff") | Some("gff3")
        );

        if !is_region || !path.is_file() {
            continue;
        }

        if let Some(label) = path.file_stem().and_then(|stem| stem.to_str()) {
            regions.push(Region {
                label: label.to_string(),
                path: path.clone(),
            });
        }
    }

    regions.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(regions)
}

/// `bedtools tag -i <bam> -files <gff> -labels <label> > <dst>`
fn tag_alignment(bam: &Path, region: &Region, dst: &Path) -> CommandLine {
    CommandLine::new(
        Invocation::new("bedtools")
            .arg("tag")
            .arg("-i")
            .path_arg(bam)
            .arg("-files")
            .path_arg(&region.path)
            .arg("-labels")
            .arg(region.label.as_str()),
    )
    .stdout_to(dst)
}

/// `bedtools coverage -a <gff> -b <bam> > <dst>`
fn region_coverage(bam: &Path, region: &Region, dst: &Path) -> CommandLine {
    CommandLine::new(
        Invocation::new("bedtools")
            .arg("coverage")
            .arg("-a")
            .path_arg(&region.path)
            .arg("-b")
            .path_arg(bam),
    )
    .stdout_to(dst)
}

/// `bedtools bamtobed -i <bam> | bedtools merge -d <distance> -c 4 -o count > <dst>`
fn clusters(bam: &Path, distance: u64, dst: &Path) -> CommandLine {
    CommandLine::new(
        Invocation::new("bedtools")
            .arg("bamtobed")
            .arg("-i")
            .path_arg(bam),
    )
    .pipe(
        Invocation::new("bedtools")
            .arg("merge")
            .arg("-d")
            .arg(distance.to_string())
            .args(["-c", "4", "-o", "count"]),
    )
    .stdout_to(dst)
}

/// `bedtools intersect -a <clusters> -b <gff> -loj > <dst>`
fn clusters_by_region(clusters: &Path, region: &Region, dst: &Path) -> CommandLine {
    CommandLine::new(
        Invocation::new("bedtools")
            .arg("intersect")
            .arg("-a")
            .path_arg(clusters)
            .arg("-b")
            .path_arg(&region.path)
            .arg("-loj"),
    )
    .stdout_to(dst)
}

impl Pipeline {
    pub(super) fn analyze(&mut self, mut sample: Sample) -> anyhow::Result<Sample> {
        self.quantify_sample(&mut sample)?;

        if sample.sample_type == SampleType::Crosslinking {
            let clusters = self.cluster_reads(&sample)?;

            match self.regions()? {
                Some(regions) => {
                    self.region_events(&sample, &regions)?;
                    self.overlap_clusters(&sample, &clusters, &regions)?;
                }
                None => warn!(
                    "No region files configured for {}; skipping events and region overlaps.",
                    sample
                ),
            }
        }

        Ok(sample)
    }

    /// Always recomputed, so tables track the current reference annotation.
    fn quantify_sample(&self, sample: &mut Sample) -> anyhow::Result<()> {
        let unique = required(&sample.outputs.unique, "unique alignment")?;

        let dir = self.layout.sample_rpkm_dir(&sample.label);
        ensure_dir(&dir)?;

        let tables = quantification::quantify(&sample.label, unique, &self.annotation)?;
        for (name, table) in tables {
            let dst = self.layout.sample_rpkm_table(&sample.label, &name);
            table.write(&dst)?;
            info!("Wrote {} table to {}", name, dst.display());
            sample.outputs.quantification.insert(name, dst);
        }

        Ok(())
    }

    fn regions(&self) -> anyhow::Result<Option<Vec<Region>>> {
        let dir = match &self.config.region_dir {
            Some(dir) => dir,
            None => return Ok(None),
        };

        if !dir.is_dir() {
            warn!("Region directory does not exist: {}", dir.display());
            return Ok(None);
        }

        let regions = region_files(dir)?;
        if regions.is_empty() {
            warn!("No *.gff or *.gff3 files in {}", dir.display());
        }

        Ok(Some(regions))
    }

    fn region_events(&self, sample: &Sample, regions: &[Region]) -> anyhow::Result<()> {
        let bam = required(&sample.outputs.dedup, "de-duplicated alignment")?;

        let events_dir = self.layout.events_dir(&sample.label);
        let bam_dir = events_dir.join("bam");
        let bed_dir = events_dir.join("bed");
        ensure_dir(&bam_dir)?;
        ensure_dir(&bed_dir)?;

        for region in regions {
            info!("Computing {} events for {}", region.label, sample);

            let tagged = bam_dir.join(format!("{}.bam", region.label));
            cache::cached_command(&tagged, |dst| tag_alignment(bam, region, dst))?;

            let coverage = bed_dir.join(format!("{}.bed", region.label));
            cache::cached_command(&coverage, |dst| region_coverage(bam, region, dst))?;
        }

        Ok(())
    }

    /// Merges the reference-subtracted reads into clusters. Returns the
    /// clusters file.
    fn cluster_reads(&self, sample: &Sample) -> anyhow::Result<PathBuf> {
        let bam = required(
            &sample.outputs.reference_subtracted,
            "reference-subtracted alignment",
        )?;

        let clusters_dir = self.layout.clusters_dir(&sample.label);
        ensure_dir(&clusters_dir)?;

        let merged = clusters_dir.join(format!("{}.clusters.bed", bam_stem(bam)?));
        let distance = self.config.cluster_distance;
        info!("Clustering reads of {} into {}", sample, merged.display());
        cache::cached_command(&merged, |dst| clusters(bam, distance, dst))?;

        Ok(merged)
    }

    fn overlap_clusters(
        &self,
        sample: &Sample,
        clusters: &Path,
        regions: &[Region],
    ) -> anyhow::Result<()> {
        let by_events_dir = self.layout.clusters_dir(&sample.label).join("by_events");
        ensure_dir(&by_events_dir)?;

        for region in regions {
            let dst = by_events_dir.join(format!("{}.bed", region.label));
            cache::cached_command(&dst, |dst| clusters_by_region(clusters, region, dst))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use super::*;

    fn region(label: &str) -> Region {
        Region {
            label: label.to_string(),
            path: PathBuf::from(format!("/regions/{}.gff3", label)),
        }
    }

    #[test]
    fn test_region_files_are_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["utr3.gff3", "introns.gff", "notes.txt", "exons.gff3"] {
            File::create(dir.path().join(name)).unwrap();
        }
        fs::create_dir(dir.path().join("nested.gff")).unwrap();

        let labels: Vec<_> = region_files(dir.path())
            .unwrap()
            .into_iter()
            .map(|region| region.label)
            .collect();
        assert_eq!(labels, ["exons", "introns", "utr3"]);
    }

    #[test]
    fn test_event_commands() {
        let bam = Path::new("A.rmdups.sorted.bam");

        assert_eq!(
            tag_alignment(bam, &region("exons"), Path::new("bam/exons.bam")).to_string(),
            "bedtools tag -i A.rmdups.sorted.bam -files /regions/exons.gff3 -labels exons \
             > bam/exons.bam"
        );
        assert_eq!(
            region_coverage(bam, &region("exons"), Path::new("bed/exons.bed")).to_string(),
            "bedtools coverage -a /regions/exons.gff3 -b A.rmdups.sorted.bam > bed/exons.bed"
        );
    }

    #[test]
    fn test_cluster_commands() {
        let command = clusters(
            Path::new("A.ribosub.sorted.bam"),
            30,
            Path::new("A.ribosub.sorted.clusters.bed"),
        );
        assert_eq!(
            command.to_string(),
            "bedtools bamtobed -i A.ribosub.sorted.bam | bedtools merge -d 30 -c 4 -o count \
             > A.ribosub.sorted.clusters.bed"
        );

        let command = clusters_by_region(
            Path::new("A.ribosub.sorted.clusters.bed"),
            &region("utr3"),
            Path::new("by_events/utr3.bed"),
        );
        assert_eq!(
            command.to_string(),
            "bedtools intersect -a A.ribosub.sorted.clusters.bed -b /regions/utr3.gff3 -loj \
             > by_events/utr3.bed"
        );
    }
}
