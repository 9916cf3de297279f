//! Randomized resize workload.
//!
//! Builds `vectors` integer containers and `vectors` point containers of
//! random length, resizes random pairs of them `picks` times, then writes one
//! element of a random container of each kind and reads it back.

use mempool::{AllocError, ElementAllocator, SlabPool, error::Location};
use rand::{Rng as _, rngs::StdRng};
use snafu::{ResultExt as _, Snafu, ensure};

use crate::container::{Node, PoolList, PoolVec};

pub type Point = (i32, i32);

const INT_MARK: i32 = 10;
const POINT_MARK: Point = (11, 15);

#[derive(Debug, Clone, Copy)]
pub struct Params {
    pub vectors: usize,
    pub picks: usize,
    pub max_len: usize,
}

/// What a finished run touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Elements alive at the end of the run, both kinds together.
    pub elements: usize,
    /// Integer container that received the marker value.
    pub int_index: usize,
    /// Point container that received the marker value.
    pub point_index: usize,
}

#[derive(Debug, Snafu)]
pub enum WorkloadError {
    #[snafu(display("allocation failed while {action}"))]
    Alloc {
        action: &'static str,
        #[snafu(implicit)]
        location: Location,
        source: AllocError,
    },
    #[snafu(display("{kind} container {index} holds {actual} elements, expected {expected}"))]
    Length {
        kind: &'static str,
        index: usize,
        actual: usize,
        expected: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("assignment to {kind} container {index} did not stick"))]
    Assignment {
        kind: &'static str,
        index: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Runs the workload over contiguous containers.
///
/// Every container gets its own copy of `ints` or `points`.
pub fn run_vectors<I, P>(
    ints: &I,
    points: &P,
    params: Params,
    rng: &mut StdRng,
) -> Result<Outcome, WorkloadError>
where
    I: ElementAllocator<Value = i32> + Clone,
    P: ElementAllocator<Value = Point> + Clone,
{
    let mut int_vecs = (0..params.vectors)
        .map(|_| PoolVec::new_in(ints.clone()))
        .collect::<Vec<_>>();
    for v in &mut int_vecs {
        v.resize(rng.gen_range(1..=params.max_len), 0)
            .context(AllocSnafu {
                action: "creating integer vectors",
            })?;
    }

    let mut point_vecs = (0..params.vectors)
        .map(|_| PoolVec::new_in(points.clone()))
        .collect::<Vec<_>>();
    for v in &mut point_vecs {
        v.resize(rng.gen_range(1..=params.max_len), (0, 0))
            .context(AllocSnafu {
                action: "creating point vectors",
            })?;
    }

    let mut int_lens = int_vecs.iter().map(PoolVec::len).collect::<Vec<_>>();
    let mut point_lens = point_vecs.iter().map(PoolVec::len).collect::<Vec<_>>();
    for _ in 0..params.picks {
        let index = rng.gen_range(0..params.vectors);
        let len = rng.gen_range(1..=params.max_len);
        int_vecs[index]
            .resize(len, 0)
            .context(AllocSnafu {
                action: "resizing an integer vector",
            })?;
        point_vecs[index]
            .resize(len, (0, 0))
            .context(AllocSnafu {
                action: "resizing a point vector",
            })?;
        int_lens[index] = len;
        point_lens[index] = len;
    }

    check_lengths("integer", int_vecs.iter().map(PoolVec::len), &int_lens)?;
    check_lengths("point", point_vecs.iter().map(PoolVec::len), &point_lens)?;

    let int_index = rng.gen_range(0..params.vectors);
    let middle = int_vecs[int_index].len() / 2;
    int_vecs[int_index][middle] = INT_MARK;
    ensure!(
        int_vecs[int_index][middle] == INT_MARK,
        AssignmentSnafu {
            kind: "integer",
            index: int_index,
        }
    );

    let point_index = rng.gen_range(0..params.vectors);
    let middle = point_vecs[point_index].len() / 2;
    point_vecs[point_index][middle] = POINT_MARK;
    ensure!(
        point_vecs[point_index][middle] == POINT_MARK,
        AssignmentSnafu {
            kind: "point",
            index: point_index,
        }
    );

    Ok(Outcome {
        elements: int_lens.iter().sum::<usize>() + point_lens.iter().sum::<usize>(),
        int_index,
        point_index,
    })
}

/// Linked lists of one element type sharing a slab pool.
struct Lists<T> {
    pool: SlabPool<Node<T>>,
    lists: Vec<PoolList<T>>,
}

impl<T> Lists<T>
where
    T: Clone + PartialEq,
{
    fn new(count: usize) -> Self {
        Self {
            pool: SlabPool::new(),
            lists: (0..count).map(|_| PoolList::default()).collect(),
        }
    }

    fn resize(&mut self, index: usize, len: usize, value: &T) -> Result<(), AllocError> {
        self.lists[index].resize(&mut self.pool, len, value)
    }

    fn lens(&self) -> Vec<usize> {
        self.lists.iter().map(|list| list.iter().count()).collect()
    }

    /// Overwrites the front element of list `index` and reads it back.
    fn mark_front(&mut self, index: usize, value: &T) -> bool {
        let list = &mut self.lists[index];
        if let Some(front) = list.front_mut() {
            *front = value.clone();
        }
        list.iter().next() == Some(value)
    }
}

impl<T> Drop for Lists<T> {
    fn drop(&mut self) {
        for list in &mut self.lists {
            list.clear(&mut self.pool);
        }
    }
}

/// Runs the workload over linked lists whose nodes come from slab pools.
pub fn run_lists(params: Params, rng: &mut StdRng) -> Result<Outcome, WorkloadError> {
    let mut ints = Lists::<i32>::new(params.vectors);
    for index in 0..params.vectors {
        ints.resize(index, rng.gen_range(1..=params.max_len), &0)
            .context(AllocSnafu {
                action: "creating integer lists",
            })?;
    }
    let mut points = Lists::<Point>::new(params.vectors);
    for index in 0..params.vectors {
        points
            .resize(index, rng.gen_range(1..=params.max_len), &(0, 0))
            .context(AllocSnafu {
                action: "creating point lists",
            })?;
    }

    let mut int_lens = ints.lens();
    let mut point_lens = points.lens();
    for _ in 0..params.picks {
        let index = rng.gen_range(0..params.vectors);
        let len = rng.gen_range(1..=params.max_len);
        ints.resize(index, len, &0).context(AllocSnafu {
            action: "resizing an integer list",
        })?;
        points.resize(index, len, &(0, 0)).context(AllocSnafu {
            action: "resizing a point list",
        })?;
        int_lens[index] = len;
        point_lens[index] = len;
    }

    check_lengths("integer", ints.lens(), &int_lens)?;
    check_lengths("point", points.lens(), &point_lens)?;

    let int_index = rng.gen_range(0..params.vectors);
    ensure!(
        ints.mark_front(int_index, &INT_MARK),
        AssignmentSnafu {
            kind: "integer",
            index: int_index,
        }
    );
    let point_index = rng.gen_range(0..params.vectors);
    ensure!(
        points.mark_front(point_index, &POINT_MARK),
        AssignmentSnafu {
            kind: "point",
            index: point_index,
        }
    );

    log::debug!(
        "slab pools hold {} + {} blocks",
        ints.pool.blocks(),
        points.pool.blocks()
    );
    Ok(Outcome {
        elements: int_lens.iter().sum::<usize>() + point_lens.iter().sum::<usize>(),
        int_index,
        point_index,
    })
}

fn check_lengths<I>(kind: &'static str, actual: I, expected: &[usize]) -> Result<(), WorkloadError>
where
    I: IntoIterator<Item = usize>,
{
    for (index, (actual, &expected)) in actual.into_iter().zip(expected).enumerate() {
        ensure!(
            actual == expected,
            LengthSnafu {
                kind,
                index,
                actual,
                expected,
            }
        );
    }
    Ok(())
}
