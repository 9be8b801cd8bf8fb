use super::ReplacementStrategy;

/// LRU: 记录每个槽位最后一次被访问的时刻, 置换最久未用者
/// None 表示从未被访问, 比任何时刻都旧
pub struct ReplacementLru {
    last_used: Vec<Option<usize>>,
}

impl ReplacementLru {
    pub fn new(size: usize) -> Self {
        assert!(size > 0);
        Self {
            last_used: vec![None; size],
        }
    }
}

impl ReplacementStrategy for ReplacementLru {
    fn find_one_to_replace(&mut self) -> usize {
        let mut target = 0;
        for (id, stamp) in self.last_used.iter().enumerate() {
            if *stamp < self.last_used[target] {
                target = id;
            }
        }
        target
    }

    fn update_element_weight(&mut self, id: usize, now: usize) {
        self.last_used[id] = Some(now);
    }

    fn reset_status(&mut self) {
        self.last_used.iter_mut().for_each(|stamp| *stamp = None);
    }
}
